use crate::domain::ports::ReferenceSource;
use chrono::Utc;

/// Wall-clock reference source producing the `TXN-<millis in base 36>` format
/// shown on transfer receipts.
#[derive(Default, Clone)]
pub struct SystemReferences;

impl SystemReferences {
    pub fn new() -> Self {
        Self
    }
}

impl ReferenceSource for SystemReferences {
    fn next_reference(&self) -> String {
        format!("TXN-{}", to_base36(Utc::now().timestamp_millis()))
    }
}

fn to_base36(mut value: i64) -> String {
    const DIGITS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    if value <= 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).expect("base36 digits are ascii")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base36_encoding() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "Z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(1_234_567_890), "KF12OI");
    }

    #[test]
    fn test_reference_format() {
        let reference = SystemReferences::new().next_reference();
        assert!(reference.starts_with("TXN-"));
        assert!(
            reference[4..]
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
        );
    }
}
