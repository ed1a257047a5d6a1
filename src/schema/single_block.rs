//! Serde helper for nested blocks limited to one element.
//!
//! Configuration spells such blocks as a list (`definition: [{...}]`); the typed
//! structs hold an `Option<T>`. A bare object is accepted on input too.

use serde::de::{Deserialize, Deserializer, Error as _};
use serde::ser::{Serialize, SerializeSeq, Serializer};

pub fn serialize<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
where
    T: Serialize,
    S: Serializer,
{
    let len = usize::from(value.is_some());
    let mut seq = serializer.serialize_seq(Some(len))?;
    if let Some(v) = value {
        seq.serialize_element(v)?;
    }
    seq.end()
}

pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    #[derive(serde::Deserialize)]
    #[serde(untagged)]
    enum OneOrList<T> {
        List(Vec<T>),
        One(T),
    }

    match Option::<OneOrList<T>>::deserialize(deserializer)? {
        None => Ok(None),
        Some(OneOrList::One(v)) => Ok(Some(v)),
        Some(OneOrList::List(mut items)) => match items.len() {
            0 => Ok(None),
            1 => Ok(items.pop()),
            n => Err(D::Error::custom(format!(
                "expected at most 1 block, found {n}"
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Inner {
        content: String,
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Outer {
        #[serde(default, with = "super")]
        definition: Option<Inner>,
    }

    #[test]
    fn test_list_and_object_forms() {
        let a: Outer = serde_json::from_str(r#"{"definition":[{"content":"x"}]}"#).unwrap();
        let b: Outer = serde_json::from_str(r#"{"definition":{"content":"x"}}"#).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            r#"{"definition":[{"content":"x"}]}"#
        );
    }

    #[test]
    fn test_empty_and_missing() {
        let a: Outer = serde_json::from_str(r#"{"definition":[]}"#).unwrap();
        let b: Outer = serde_json::from_str("{}").unwrap();
        assert!(a.definition.is_none());
        assert!(b.definition.is_none());
        assert_eq!(serde_json::to_string(&b).unwrap(), r#"{"definition":[]}"#);
    }

    #[test]
    fn test_too_many_blocks() {
        let err = serde_json::from_str::<Outer>(
            r#"{"definition":[{"content":"x"},{"content":"y"}]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("at most 1 block"));
    }
}
