//! Post-restore verification
//!
//! Compares the canonical text of every expected document with what the
//! store holds after the restore.

use std::collections::BTreeMap;
use std::fmt;

/// Example ids printed per defect class
const MAX_EXAMPLES: usize = 5;

/// Defects found when re-reading a restored collection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationReport {
    /// Expected but not present
    pub missing: Vec<String>,
    /// Present with different content
    pub mismatched: Vec<String>,
    /// Present but not expected
    pub extra: Vec<String>,
}

impl VerificationReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.mismatched.is_empty() && self.extra.is_empty()
    }

    pub fn defect_count(&self) -> usize {
        self.missing.len() + self.mismatched.len() + self.extra.len()
    }
}

fn write_class(f: &mut fmt::Formatter<'_>, label: &str, ids: &[String]) -> fmt::Result {
    write!(f, "{} {} [", label, ids.len())?;
    let shown = &ids[..ids.len().min(MAX_EXAMPLES)];
    write!(f, "{}", shown.join(", "))?;
    if ids.len() > MAX_EXAMPLES {
        write!(f, " +{} more", ids.len() - MAX_EXAMPLES)?;
    }
    write!(f, "]")
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let classes = [
            ("missing", &self.missing),
            ("mismatched", &self.mismatched),
            ("extra", &self.extra),
        ];
        let mut first = true;
        for (label, ids) in classes {
            if ids.is_empty() {
                continue;
            }
            if !first {
                write!(f, "; ")?;
            }
            write_class(f, label, ids)?;
            first = false;
        }
        if first {
            write!(f, "no defects")?;
        }
        Ok(())
    }
}

/// Diff expected against live documents, both keyed by id with canonical
/// text as value. Extra live documents count only when `check_extra` is set.
pub fn diff_documents(
    expected: &BTreeMap<String, String>,
    live: &BTreeMap<String, String>,
    check_extra: bool,
) -> VerificationReport {
    let mut report = VerificationReport::default();

    for (id, want) in expected {
        match live.get(id) {
            None => report.missing.push(id.clone()),
            Some(got) if got != want => report.mismatched.push(id.clone()),
            Some(_) => {}
        }
    }

    if check_extra {
        report.extra = live
            .keys()
            .filter(|id| !expected.contains_key(*id))
            .cloned()
            .collect();
    }

    report
}
