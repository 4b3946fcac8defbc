use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A field of a partial update.
///
/// `Absent` leaves the stored value untouched, `Present` replaces it. For
/// nullable fields the payload type is an `Option`, so `Present(None)` clears
/// the stored value while `Absent` keeps it.
///
/// Use together with `#[serde(default)]` so that a missing JSON key becomes
/// `Absent` and an explicit `null` becomes `Present(None)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionalValue<T> {
    Absent,
    Present(T),
}

impl<T> Default for OptionalValue<T> {
    fn default() -> Self {
        OptionalValue::Absent
    }
}

impl<T> OptionalValue<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, OptionalValue::Absent)
    }

    pub fn if_present<F>(self, f: F)
    where
        F: FnOnce(T),
    {
        if let OptionalValue::Present(value) = self {
            f(value)
        }
    }
}

impl<'de, T> Deserialize<'de> for OptionalValue<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        T::deserialize(deserializer).map(OptionalValue::Present)
    }
}

impl<T> Serialize for OptionalValue<T>
where
    T: Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            OptionalValue::Absent => serializer.serialize_none(),
            OptionalValue::Present(value) => value.serialize(serializer),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug, Deserialize, Serialize)]
    struct Update {
        #[serde(default, skip_serializing_if = "OptionalValue::is_absent")]
        name: OptionalValue<String>,
        #[serde(default, skip_serializing_if = "OptionalValue::is_absent")]
        description: OptionalValue<Option<String>>,
    }

    #[test]
    fn absent_and_null_are_distinct() {
        let update: Update = serde_json::from_str(r#"{"description": null}"#).unwrap();
        assert_eq!(update.name, OptionalValue::Absent);
        assert_eq!(update.description, OptionalValue::Present(None));

        let update: Update = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(update.name, OptionalValue::Absent);
        assert_eq!(update.description, OptionalValue::Absent);

        let update: Update =
            serde_json::from_str(r#"{"name": "core", "description": "text"}"#).unwrap();
        assert_eq!(update.name, OptionalValue::Present("core".to_owned()));
        assert_eq!(
            update.description,
            OptionalValue::Present(Some("text".to_owned()))
        );
    }

    #[test]
    fn null_is_rejected_for_required_fields() {
        assert!(serde_json::from_str::<Update>(r#"{"name": null}"#).is_err());
    }

    #[test]
    fn absent_fields_are_not_serialized() {
        let update = Update {
            name: OptionalValue::Absent,
            description: OptionalValue::Present(None),
        };

        assert_eq!(
            serde_json::to_string(&update).unwrap(),
            r#"{"description":null}"#
        );
    }
}
