//! `Duration` as a number of seconds.
//!
//! Session reports may carry fractional seconds; they are accepted and kept at millisecond
//! precision. Serialization always writes whole seconds (rounded down).

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum Seconds {
    Whole(u64),
    Fractional(f64),
}

pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(value.as_secs())
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Seconds::deserialize(deserializer)? {
        Seconds::Whole(secs) => Duration::from_secs(secs),
        Seconds::Fractional(secs) if secs.is_finite() && secs > 0.0 => {
            Duration::from_millis((secs * 1000.0).min(u64::MAX as f64) as u64)
        }
        Seconds::Fractional(_) => Duration::ZERO,
    })
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Wrapper {
        #[serde(with = "crate::serde_duration")]
        t: Duration,
    }

    #[test]
    fn accepts_whole_and_fractional_seconds() {
        let w: Wrapper = serde_json::from_str(r#"{"t":42}"#).expect("whole seconds");
        assert_eq!(w.t, Duration::from_secs(42));

        let w: Wrapper = serde_json::from_str(r#"{"t":1.5}"#).expect("fractional seconds");
        assert_eq!(w.t, Duration::from_millis(1500));

        let w: Wrapper = serde_json::from_str(r#"{"t":-3.0}"#).expect("negative seconds");
        assert_eq!(w.t, Duration::ZERO);
    }

    #[test]
    fn writes_whole_seconds() {
        let json = serde_json::to_string(&Wrapper {
            t: Duration::from_millis(61_900),
        })
        .expect("serialize");
        assert_eq!(json, r#"{"t":61}"#);
    }
}
