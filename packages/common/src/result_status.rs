#[cfg(feature = "sea-orm")]
use sea_orm::prelude::StringLen;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a single testcase result.
///
/// When the `sea-orm` feature is enabled, this enum can be used directly in SeaORM entities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResultStatus {
    /// Dispatched to the grading fleet, no answer yet.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "GRADING"))]
    Grading,
    /// The testcase failed.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "ERROR"))]
    Error,
    /// The testcase passed.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "DONE"))]
    Done,
}

impl ResultStatus {
    /// Returns true once grading has produced an outcome. Results never
    /// leave a terminal status for `GRADING`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Grading)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grading => "GRADING",
            Self::Error => "ERROR",
            Self::Done => "DONE",
        }
    }

    /// Status a grading outcome maps to.
    pub fn from_pass(pass: bool) -> Self {
        if pass { Self::Done } else { Self::Error }
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derive a submission's status from its per-testcase results.
///
/// Any `ERROR` wins, then any `GRADING`; only an all-`DONE` set is `DONE`.
/// An empty set has nothing graded yet and reports `GRADING`.
pub fn aggregate_status<I>(statuses: I) -> ResultStatus
where
    I: IntoIterator<Item = ResultStatus>,
{
    let mut seen_any = false;
    let mut pending = false;

    for status in statuses {
        seen_any = true;
        match status {
            ResultStatus::Error => return ResultStatus::Error,
            ResultStatus::Grading => pending = true,
            ResultStatus::Done => {}
        }
    }

    if pending || !seen_any {
        ResultStatus::Grading
    } else {
        ResultStatus::Done
    }
}
