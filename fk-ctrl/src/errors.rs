use fk_core::errors::*;

err_impl! {FakeKubeletError,
    #[error("CNI allocation requested but not supported by this build: {0}")]
    CniUnsupported(String),

    #[error("invalid server address: {0}")]
    InvalidServerAddress(String),
}
