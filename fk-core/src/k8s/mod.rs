mod selector;
mod util;

pub use selector::*;
pub use util::*;

use crate::errors::*;
use crate::prelude::*;

err_impl! {KubernetesError,
    #[error("field not found in struct: {0}")]
    FieldNotFound(String),

    #[error("malformed selector expression: {0}")]
    MalformedSelectorExpression(String),
}

pub trait KubeResourceExt {
    fn namespaced_name(&self) -> String;
}

// Helper accessors for the optional fields we touch on every pod event
pub trait PodExt {
    fn spec(&self) -> anyhow::Result<&corev1::PodSpec>;
    fn node_name(&self) -> Option<&str>;
    fn pod_ip(&self) -> Option<&str>;
}

#[cfg(test)]
mod tests;
