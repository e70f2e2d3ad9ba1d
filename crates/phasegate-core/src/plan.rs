use crate::frontmatter::{self, MustHaves};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub id: String,
    pub wave: u32,
    pub depends_on: Vec<String>,
    pub autonomous: bool,
    pub must_haves: MustHaves,
    pub gap_closure: bool,
}

impl Plan {
    /// Decode a plan document. `fallback_id` (usually the file stem) is used
    /// when the front matter carries no `plan` key.
    pub fn from_document(fallback_id: &str, text: &str) -> Self {
        let fm = frontmatter::parse(text);
        let wave = fm
            .get_int("wave")
            .filter(|w| *w > 0)
            .and_then(|w| u32::try_from(w).ok())
            .unwrap_or(1);
        Self {
            id: fm.get_str("plan").unwrap_or_else(|| fallback_id.to_string()),
            wave,
            depends_on: fm.get_list("depends_on"),
            autonomous: fm.get_bool("autonomous").unwrap_or(true),
            must_haves: fm.must_haves().cloned().unwrap_or_default(),
            gap_closure: fm.get_bool("gap_closure").unwrap_or(false),
        }
    }
}

/// Report every `depends_on` entry that names an unknown plan or a plan that
/// does not sit in an earlier wave.
pub fn check_wave_order(plans: &[Plan]) -> Vec<String> {
    let waves: HashMap<&str, u32> = plans.iter().map(|p| (p.id.as_str(), p.wave)).collect();
    let mut problems = Vec::new();
    for plan in plans {
        for dep in &plan.depends_on {
            match waves.get(dep.as_str()) {
                None => problems.push(format!(
                    "plan {} depends on unknown plan {}",
                    plan.id, dep
                )),
                Some(&dep_wave) if dep_wave >= plan.wave => problems.push(format!(
                    "plan {} (wave {}) depends on {} (wave {}); dependencies must be in an earlier wave",
                    plan.id, plan.wave, dep, dep_wave
                )),
                Some(_) => {}
            }
        }
    }
    problems
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub plan: Option<String>,
    pub status: Option<String>,
}

impl Summary {
    pub fn from_document(text: &str) -> Self {
        let fm = frontmatter::parse(text);
        Self {
            plan: fm.get_str("plan"),
            status: fm.get_str("status"),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status.as_deref() == Some("complete")
    }
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Passed,
    GapsFound,
    HumanNeeded,
    Other(String),
    /// The document exists but carries no readable status.
    Unknown,
}

impl VerificationStatus {
    pub fn from_document(text: &str) -> Self {
        match frontmatter::parse(text).get_str("status") {
            Some(s) => Self::parse(&s),
            None => VerificationStatus::Unknown,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "passed" => VerificationStatus::Passed,
            "gaps_found" => VerificationStatus::GapsFound,
            "human_needed" => VerificationStatus::HumanNeeded,
            "" => VerificationStatus::Unknown,
            other => VerificationStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationStatus::Passed => f.write_str("passed"),
            VerificationStatus::GapsFound => f.write_str("gaps_found"),
            VerificationStatus::HumanNeeded => f.write_str("human_needed"),
            VerificationStatus::Other(s) => f.write_str(s),
            VerificationStatus::Unknown => f.write_str("unknown"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(id: &str, wave: u32, deps: &[&str]) -> Plan {
        Plan {
            id: id.to_string(),
            wave,
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
            autonomous: true,
            must_haves: MustHaves::default(),
            gap_closure: false,
        }
    }

    #[test]
    fn plan_defaults() {
        let p = Plan::from_document("02-01-PLAN", "# no front matter\n");
        assert_eq!(p.id, "02-01-PLAN");
        assert_eq!(p.wave, 1);
        assert!(p.autonomous);
        assert!(!p.gap_closure);
        assert!(p.depends_on.is_empty());
        assert!(p.must_haves.is_empty());
    }

    #[test]
    fn plan_from_front_matter() {
        let text = "---\nplan: 02-02\nwave: 2\ndepends_on: [02-01]\nautonomous: false\ngap_closure: true\nmust_haves:\n  truths:\n    - tokens expire\n---\n";
        let p = Plan::from_document("ignored", text);
        assert_eq!(p.id, "02-02");
        assert_eq!(p.wave, 2);
        assert_eq!(p.depends_on, vec!["02-01"]);
        assert!(!p.autonomous);
        assert!(p.gap_closure);
        assert_eq!(p.must_haves.truths, vec!["tokens expire"]);
    }

    #[test]
    fn zero_wave_falls_back_to_one() {
        let p = Plan::from_document("x", "---\nwave: 0\n---\n");
        assert_eq!(p.wave, 1);
    }

    #[test]
    fn wave_order_problems() {
        let plans = vec![
            plan("01", 1, &[]),
            plan("02", 2, &["01"]),
            plan("03", 2, &["02"]),
            plan("04", 3, &["99"]),
        ];
        let problems = check_wave_order(&plans);
        assert_eq!(problems.len(), 2);
        assert!(problems[0].contains("plan 03 (wave 2) depends on 02 (wave 2)"));
        assert!(problems[1].contains("unknown plan 99"));
    }

    #[test]
    fn summary_completion() {
        assert!(Summary::from_document("---\nstatus: complete\n---\n").is_complete());
        assert!(!Summary::from_document("---\nstatus: partial\n---\n").is_complete());
        assert!(!Summary::from_document("no front matter").is_complete());
    }

    #[test]
    fn verification_statuses() {
        assert_eq!(
            VerificationStatus::from_document("---\nstatus: passed\n---\n"),
            VerificationStatus::Passed
        );
        assert_eq!(
            VerificationStatus::from_document("---\nstatus: \"gaps_found\"\n---\n"),
            VerificationStatus::GapsFound
        );
        assert_eq!(
            VerificationStatus::from_document("---\nstatus: partial\n---\n"),
            VerificationStatus::Other("partial".into())
        );
        assert_eq!(
            VerificationStatus::from_document("garbage"),
            VerificationStatus::Unknown
        );
    }
}
