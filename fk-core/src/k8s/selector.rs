use std::collections::BTreeMap;
use std::str::FromStr;

use super::KubernetesError;
use crate::errors::*;
use crate::prelude::*;

// Equality-based selectors in their string form, as they arrive on the
// command line: "env=prod,tier!=db,gpu,!spot".  Set-based expressions are
// not accepted here; those only appear in LabelSelector objects.
#[derive(Clone, Debug, Eq, PartialEq)]
enum Requirement {
    Equals(String, String),
    NotEquals(String, String),
    Exists(String),
    DoesNotExist(String),
}

impl Requirement {
    fn matches(&self, kvs: &BTreeMap<String, String>) -> bool {
        match self {
            Requirement::Equals(k, v) => kvs.get(k) == Some(v),
            Requirement::NotEquals(k, v) => kvs.get(k) != Some(v),
            Requirement::Exists(k) => kvs.contains_key(k),
            Requirement::DoesNotExist(k) => !kvs.contains_key(k),
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    pub fn matches(&self, kvs: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(kvs))
    }
}

impl FromStr for Selector {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Selector> {
        let mut requirements = vec![];
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            requirements.push(parse_requirement(part)?);
        }
        Ok(Selector { requirements })
    }
}

fn parse_requirement(part: &str) -> anyhow::Result<Requirement> {
    if let Some(key) = part.strip_prefix('!') {
        let key = key.trim();
        if key.is_empty() || key.contains('=') {
            bail!(KubernetesError::malformed_selector_expression(part));
        }
        return Ok(Requirement::DoesNotExist(key.into()));
    }

    let req = if let Some((k, v)) = part.split_once("!=") {
        Requirement::NotEquals(k.trim().into(), v.trim().into())
    } else if let Some((k, v)) = part.split_once("==") {
        Requirement::Equals(k.trim().into(), v.trim().into())
    } else if let Some((k, v)) = part.split_once('=') {
        Requirement::Equals(k.trim().into(), v.trim().into())
    } else {
        Requirement::Exists(part.into())
    };

    // the key must be non-empty and the value must not contain a stray '='
    let (k, maybe_v) = match &req {
        Requirement::Equals(k, v) | Requirement::NotEquals(k, v) => (k, Some(v)),
        Requirement::Exists(k) | Requirement::DoesNotExist(k) => (k, None),
    };
    if k.is_empty() || k.contains('=') || maybe_v.is_some_and(|v| v.contains('=')) {
        bail!(KubernetesError::malformed_selector_expression(part));
    }

    Ok(req)
}

// A pair of string selectors evaluated against an object's annotations and
// labels; every selector that is configured must match.
#[derive(Clone, Debug, Default)]
pub struct MetaSelector {
    pub annotations: Option<Selector>,
    pub labels: Option<Selector>,
}

impl MetaSelector {
    pub fn is_configured(&self) -> bool {
        self.annotations.is_some() || self.labels.is_some()
    }

    pub fn matches(&self, meta: &metav1::ObjectMeta) -> bool {
        let empty = BTreeMap::new();
        let annotations_match = self
            .annotations
            .as_ref()
            .is_none_or(|s| s.matches(meta.annotations.as_ref().unwrap_or(&empty)));
        let labels_match = self
            .labels
            .as_ref()
            .is_none_or(|s| s.matches(meta.labels.as_ref().unwrap_or(&empty)));

        annotations_match && labels_match
    }
}

// Decides whether this process is responsible for a given object.  Exactly
// one of the two forms must be configured; anything else fails startup
// before any watch begins.
#[derive(Clone, Debug)]
pub enum OwnershipPredicate {
    All,
    Selected(MetaSelector),
}

impl OwnershipPredicate {
    pub fn new(match_all: bool, selector: MetaSelector) -> anyhow::Result<OwnershipPredicate> {
        match (match_all, selector.is_configured()) {
            (true, true) => bail!("cannot manage all objects and also manage by selector"),
            (true, false) => Ok(OwnershipPredicate::All),
            (false, true) => Ok(OwnershipPredicate::Selected(selector)),
            (false, false) => bail!("no ownership predicate configured"),
        }
    }

    pub fn matches(&self, meta: &metav1::ObjectMeta) -> bool {
        match self {
            OwnershipPredicate::All => true,
            OwnershipPredicate::Selected(sel) => sel.matches(meta),
        }
    }
}
