use async_graphql::{InputValueError, InputValueResult, Scalar, ScalarType, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub mod user;

/// An RFC 3339 timestamp, exposed to GraphQL as `DateTime`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTimeScalar(pub OffsetDateTime);

#[Scalar(name = "DateTime")]
impl ScalarType for DateTimeScalar {
    fn parse(value: Value) -> InputValueResult<Self> {
        if let Value::String(date_str) = &value {
            if let Ok(date) = OffsetDateTime::parse(date_str, &Rfc3339) {
                return Ok(DateTimeScalar(date));
            }
        }

        Err(InputValueError::expected_type(value))
    }

    fn to_value(&self) -> Value {
        self.0
            .format(&Rfc3339)
            .map(Value::String)
            .unwrap_or(Value::Null)
    }
}

impl From<OffsetDateTime> for DateTimeScalar {
    fn from(time: OffsetDateTime) -> Self {
        DateTimeScalar(time)
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn formats_as_rfc3339() {
        let scalar = DateTimeScalar(datetime!(2024-08-30 23:41:18 UTC));
        assert_eq!(
            scalar.to_value(),
            Value::String("2024-08-30T23:41:18Z".to_owned())
        );
    }

    #[test]
    fn rejects_non_rfc3339_strings() {
        assert!(DateTimeScalar::parse(Value::String("2024-08-30 23:41:18".to_owned())).is_err());
        assert!(DateTimeScalar::parse(Value::Number(5.into())).is_err());
    }
}
