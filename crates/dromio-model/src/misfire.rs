//! Misfire policy and its label codec
//!
//! A misfire policy decides what the scheduler does with a firing it
//! missed (server down, worker pool saturated). On the wire it is an
//! externally tagged value:
//!
//! - `"skip"`, `"runImmediately"`, `"coalesce"`, `"runAll"`
//! - `{"runIfLateWithin": [secs, nanos]}`
//!
//! The dashboard shows it as a human label and reads it back from the
//! same label when a form is submitted. The label only carries whole
//! seconds, so the nanosecond part of a late window does not survive
//! the round trip; it always comes back as zero.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Nanoseconds in one second.
const NANOS_PER_SEC: u32 = 1_000_000_000;

const LATE_LABEL_PREFIX: &str = "Run if late (≤ ";
const LATE_LABEL_SUFFIX: &str = "s)";

/// Label shown for policies this client does not recognise.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Tolerance window for [`MisfirePolicy::RunIfLateWithin`].
///
/// Serialized as a `[secs, nanos]` pair. `nanos` is always sub-second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "(u64, u32)", into = "(u64, u32)")]
pub struct LateWindow {
    secs: u64,
    nanos: u32,
}

impl LateWindow {
    /// Build a window, rejecting a nanosecond component of a second or more.
    pub fn new(secs: u64, nanos: u32) -> Result<Self, MisfireLabelError> {
        if nanos >= NANOS_PER_SEC {
            return Err(MisfireLabelError::NanosOutOfRange(nanos));
        }
        Ok(Self { secs, nanos })
    }

    /// Whole-second window, the only kind the form produces.
    pub fn from_secs(secs: u64) -> Self {
        Self { secs, nanos: 0 }
    }

    pub fn secs(&self) -> u64 {
        self.secs
    }

    pub fn nanos(&self) -> u32 {
        self.nanos
    }

    /// Seconds as displayed: `secs + round(nanos / 1e9)`, half rounding up.
    pub fn display_secs(&self) -> u64 {
        let carry = if self.nanos >= NANOS_PER_SEC / 2 { 1 } else { 0 };
        self.secs.saturating_add(carry)
    }
}

impl TryFrom<(u64, u32)> for LateWindow {
    type Error = MisfireLabelError;

    fn try_from((secs, nanos): (u64, u32)) -> Result<Self, Self::Error> {
        Self::new(secs, nanos)
    }
}

impl From<LateWindow> for (u64, u32) {
    fn from(window: LateWindow) -> Self {
        (window.secs, window.nanos)
    }
}

/// What happens to a scheduled firing that was missed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WirePolicy", into = "WirePolicy")]
pub enum MisfirePolicy {
    Skip,
    #[default]
    RunImmediately,
    Coalesce,
    RunAll,
    RunIfLateWithin(LateWindow),
    /// A policy the server knows and this client does not. Kept verbatim
    /// so it can be shown as "Unknown" and written back unchanged.
    Unknown(serde_json::Value),
}

impl fmt::Display for MisfirePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode_label(self))
    }
}

/// Wire shape. Accepts both the camelCase names the API emits and the
/// snake_case spellings older forms submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum WirePolicy {
    Name(String),
    LateWithin {
        #[serde(rename = "runIfLateWithin", alias = "run_if_late_within")]
        run_if_late_within: LateWindow,
    },
    Other(serde_json::Value),
}

impl From<WirePolicy> for MisfirePolicy {
    fn from(wire: WirePolicy) -> Self {
        match wire {
            WirePolicy::Name(name) => match name.as_str() {
                "skip" => MisfirePolicy::Skip,
                "runImmediately" | "run_immediately" => MisfirePolicy::RunImmediately,
                "coalesce" => MisfirePolicy::Coalesce,
                "runAll" | "run_all" => MisfirePolicy::RunAll,
                _ => MisfirePolicy::Unknown(serde_json::Value::String(name)),
            },
            WirePolicy::LateWithin { run_if_late_within } => {
                MisfirePolicy::RunIfLateWithin(run_if_late_within)
            }
            WirePolicy::Other(value) => MisfirePolicy::Unknown(value),
        }
    }
}

impl From<MisfirePolicy> for WirePolicy {
    fn from(policy: MisfirePolicy) -> Self {
        match policy {
            MisfirePolicy::Skip => WirePolicy::Name("skip".to_string()),
            MisfirePolicy::RunImmediately => WirePolicy::Name("runImmediately".to_string()),
            MisfirePolicy::Coalesce => WirePolicy::Name("coalesce".to_string()),
            MisfirePolicy::RunAll => WirePolicy::Name("runAll".to_string()),
            MisfirePolicy::RunIfLateWithin(window) => WirePolicy::LateWithin {
                run_if_late_within: window,
            },
            MisfirePolicy::Unknown(value) => WirePolicy::Other(value),
        }
    }
}

/// Variant tag used by the job form's policy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MisfireKind {
    Skip,
    RunImmediately,
    Coalesce,
    RunAll,
    RunIfLateWithin,
}

impl MisfireKind {
    pub const ALL: [MisfireKind; 5] = [
        MisfireKind::Skip,
        MisfireKind::RunImmediately,
        MisfireKind::Coalesce,
        MisfireKind::RunAll,
        MisfireKind::RunIfLateWithin,
    ];

    /// Form tag. The late-window tag keeps the wire key's camelCase
    /// spelling; the others are the snake_case policy names.
    pub fn as_str(&self) -> &'static str {
        match self {
            MisfireKind::Skip => "skip",
            MisfireKind::RunImmediately => "run_immediately",
            MisfireKind::Coalesce => "coalesce",
            MisfireKind::RunAll => "run_all",
            MisfireKind::RunIfLateWithin => "runIfLateWithin",
        }
    }

    /// Build the policy this tag selects. `duration_secs` is only read for
    /// the late-window variant.
    pub fn to_policy(self, duration_secs: u64) -> MisfirePolicy {
        match self {
            MisfireKind::Skip => MisfirePolicy::Skip,
            MisfireKind::RunImmediately => MisfirePolicy::RunImmediately,
            MisfireKind::Coalesce => MisfirePolicy::Coalesce,
            MisfireKind::RunAll => MisfirePolicy::RunAll,
            MisfireKind::RunIfLateWithin => {
                MisfirePolicy::RunIfLateWithin(LateWindow::from_secs(duration_secs))
            }
        }
    }
}

impl fmt::Display for MisfireKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from the label codec.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MisfireLabelError {
    #[error("Unknown misfire policy label: {0}")]
    UnrecognizedLabel(String),

    #[error("Nanosecond component {0} is not sub-second")]
    NanosOutOfRange(u32),
}

/// Human label for a policy.
pub fn encode_label(policy: &MisfirePolicy) -> String {
    match policy {
        MisfirePolicy::Skip => "Skip".to_string(),
        MisfirePolicy::RunImmediately => "Run Immediately".to_string(),
        MisfirePolicy::Coalesce => "Coalesce".to_string(),
        MisfirePolicy::RunAll => "Run All".to_string(),
        MisfirePolicy::RunIfLateWithin(window) => {
            format!("{}{}{}", LATE_LABEL_PREFIX, window.display_secs(), LATE_LABEL_SUFFIX)
        }
        MisfirePolicy::Unknown(_) => UNKNOWN_LABEL.to_string(),
    }
}

/// Parse a label produced by [`encode_label`]. The late window comes back
/// with a zero nanosecond component.
pub fn decode_label(label: &str) -> Result<MisfirePolicy, MisfireLabelError> {
    match label {
        "Skip" => return Ok(MisfirePolicy::Skip),
        "Run Immediately" => return Ok(MisfirePolicy::RunImmediately),
        "Coalesce" => return Ok(MisfirePolicy::Coalesce),
        "Run All" => return Ok(MisfirePolicy::RunAll),
        _ => {}
    }

    let secs = label
        .strip_prefix(LATE_LABEL_PREFIX)
        .and_then(|rest| rest.strip_suffix(LATE_LABEL_SUFFIX))
        .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|digits| digits.parse::<u64>().ok())
        .ok_or_else(|| MisfireLabelError::UnrecognizedLabel(label.to_string()))?;

    Ok(MisfirePolicy::RunIfLateWithin(LateWindow::from_secs(secs)))
}

/// Selector tag to pre-populate a form with. Unknown policies fall back
/// to the form default, run immediately.
pub fn infer_variant_tag(policy: &MisfirePolicy) -> MisfireKind {
    match policy {
        MisfirePolicy::Skip => MisfireKind::Skip,
        MisfirePolicy::RunImmediately => MisfireKind::RunImmediately,
        MisfirePolicy::Coalesce => MisfireKind::Coalesce,
        MisfirePolicy::RunAll => MisfireKind::RunAll,
        MisfirePolicy::RunIfLateWithin(_) => MisfireKind::RunIfLateWithin,
        MisfirePolicy::Unknown(_) => MisfireKind::RunImmediately,
    }
}

/// Whole seconds of a late window; zero for every other variant.
pub fn infer_duration(policy: &MisfirePolicy) -> u64 {
    match policy {
        MisfirePolicy::RunIfLateWithin(window) => window.secs(),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn all_policies() -> Vec<MisfirePolicy> {
        vec![
            MisfirePolicy::Skip,
            MisfirePolicy::RunImmediately,
            MisfirePolicy::Coalesce,
            MisfirePolicy::RunAll,
            MisfirePolicy::RunIfLateWithin(LateWindow::from_secs(90)),
        ]
    }

    #[test]
    fn test_label_round_trip_all_variants() {
        for policy in all_policies() {
            let label = encode_label(&policy);
            assert_eq!(decode_label(&label).unwrap(), policy, "label {label}");
        }
    }

    #[test]
    fn test_round_trip_drops_nanos() {
        let policy = MisfirePolicy::RunIfLateWithin(LateWindow::new(30, 250_000_000).unwrap());
        let decoded = decode_label(&encode_label(&policy)).unwrap();
        assert_eq!(decoded, MisfirePolicy::RunIfLateWithin(LateWindow::from_secs(30)));
    }

    #[test]
    fn test_label_rounds_nanos() {
        let cases = [
            (10, 0, "Run if late (≤ 10s)"),
            (10, 499_999_999, "Run if late (≤ 10s)"),
            (10, 500_000_000, "Run if late (≤ 11s)"),
            (0, 999_999_999, "Run if late (≤ 1s)"),
        ];
        for (secs, nanos, expected) in cases {
            let policy = MisfirePolicy::RunIfLateWithin(LateWindow::new(secs, nanos).unwrap());
            assert_eq!(encode_label(&policy), expected);
        }
    }

    #[test]
    fn test_label_saturates_at_max_secs() {
        let policy: MisfirePolicy =
            serde_json::from_value(json!({"runIfLateWithin": [u64::MAX, 600_000_000]})).unwrap();
        let label = encode_label(&policy);
        assert_eq!(label, format!("Run if late (≤ {}s)", u64::MAX));
        assert_eq!(
            decode_label(&label).unwrap(),
            MisfirePolicy::RunIfLateWithin(LateWindow::from_secs(u64::MAX))
        );
    }

    #[test]
    fn test_kind_tags() {
        let tags: Vec<&str> = MisfireKind::ALL.iter().map(MisfireKind::as_str).collect();
        assert_eq!(tags, ["skip", "run_immediately", "coalesce", "run_all", "runIfLateWithin"]);
    }

    #[test]
    fn test_decode_rejects_unknown_labels() {
        for label in ["", "skip", "Run if late (≤ s)", "Run if late (≤ -3s)", "Run if late (<= 3s)", "Unknown"] {
            assert_eq!(
                decode_label(label),
                Err(MisfireLabelError::UnrecognizedLabel(label.to_string()))
            );
        }
    }

    #[test]
    fn test_nanos_must_be_sub_second() {
        assert!(LateWindow::new(1, 999_999_999).is_ok());
        assert_eq!(
            LateWindow::new(1, 1_000_000_000),
            Err(MisfireLabelError::NanosOutOfRange(1_000_000_000))
        );
        assert!(serde_json::from_value::<LateWindow>(json!([1, 1_000_000_000])).is_err());
    }

    #[test]
    fn test_wire_format() {
        assert_eq!(serde_json::to_value(MisfirePolicy::Skip).unwrap(), json!("skip"));
        assert_eq!(
            serde_json::to_value(MisfirePolicy::RunImmediately).unwrap(),
            json!("runImmediately")
        );
        assert_eq!(
            serde_json::to_value(MisfirePolicy::RunIfLateWithin(LateWindow::from_secs(5))).unwrap(),
            json!({"runIfLateWithin": [5, 0]})
        );

        let parsed: MisfirePolicy = serde_json::from_value(json!({"run_if_late_within": [7, 0]})).unwrap();
        assert_eq!(parsed, MisfirePolicy::RunIfLateWithin(LateWindow::from_secs(7)));
        let parsed: MisfirePolicy = serde_json::from_value(json!("run_all")).unwrap();
        assert_eq!(parsed, MisfirePolicy::RunAll);
    }

    #[test]
    fn test_unknown_policy_is_preserved() {
        let raw = json!({"backfill": {"max": 3}});
        let parsed: MisfirePolicy = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(parsed, MisfirePolicy::Unknown(raw.clone()));
        assert_eq!(encode_label(&parsed), "Unknown");
        assert_eq!(serde_json::to_value(&parsed).unwrap(), raw);
    }

    #[test]
    fn test_infer_for_form() {
        let late = MisfirePolicy::RunIfLateWithin(LateWindow::new(45, 10).unwrap());
        assert_eq!(infer_variant_tag(&late), MisfireKind::RunIfLateWithin);
        assert_eq!(infer_duration(&late), 45);

        assert_eq!(infer_variant_tag(&MisfirePolicy::Coalesce), MisfireKind::Coalesce);
        assert_eq!(infer_duration(&MisfirePolicy::Coalesce), 0);
        assert_eq!(
            infer_variant_tag(&MisfirePolicy::Unknown(json!("later"))),
            MisfireKind::RunImmediately
        );
    }

    #[test]
    fn test_kind_builds_policy() {
        for kind in MisfireKind::ALL {
            let policy = kind.to_policy(12);
            assert_eq!(infer_variant_tag(&policy), kind);
        }
        assert_eq!(infer_duration(&MisfireKind::RunIfLateWithin.to_policy(12)), 12);
    }
}
