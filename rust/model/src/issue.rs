// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Non-fatal problems, isolated per entity and aggregated per run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Entity excluded from matched elements
    UnclassifiedEntity,
    /// Template group below the minimum sample count
    InsufficientSamples,
    /// Storey could not be determined; offset fell back
    StoreyResolutionFailure,
    /// Separation reached its iteration bound
    ConvergenceFailure,
    /// Several entities derived the same element id
    DuplicateIdentifier,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IssueKind::UnclassifiedEntity => "UnclassifiedEntity",
            IssueKind::InsufficientSamples => "InsufficientSamples",
            IssueKind::StoreyResolutionFailure => "StoreyResolutionFailure",
            IssueKind::ConvergenceFailure => "ConvergenceFailure",
            IssueKind::DuplicateIdentifier => "DuplicateIdentifier",
        };
        f.write_str(s)
    }
}

/// One recorded non-fatal problem
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Issue {
    pub kind: IssueKind,
    /// Entity, element or template the issue is about
    pub subject: String,
    pub message: String,
}

impl Issue {
    pub fn new(kind: IssueKind, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
            message: message.into(),
        }
    }
}

/// Count issues per kind.
pub fn count_by_kind(issues: &[Issue]) -> BTreeMap<IssueKind, usize> {
    let mut counts = BTreeMap::new();
    for issue in issues {
        *counts.entry(issue.kind).or_insert(0) += 1;
    }
    counts
}
