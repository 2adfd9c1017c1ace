use fk_core::errors::*;
use fk_core::metrics::MemoryRecorder;
use rocket::State;

use crate::errors::FakeKubeletError;

#[rocket::get("/healthz")]
fn healthz() -> &'static str {
    "ok"
}

#[rocket::get("/readyz")]
fn readyz() -> &'static str {
    "ok"
}

#[rocket::get("/livez")]
fn livez() -> &'static str {
    "ok"
}

#[rocket::get("/metrics")]
fn metrics_text(recorder: &State<MemoryRecorder>) -> String {
    recorder.render()
}

pub fn build(addr: &str, recorder: MemoryRecorder) -> anyhow::Result<rocket::Rocket<rocket::Build>> {
    let addr: std::net::SocketAddr = addr.parse().map_err(|_| FakeKubeletError::invalid_server_address(addr))?;
    let config = rocket::Config {
        address: addr.ip(),
        port: addr.port(),
        ..rocket::Config::default()
    };

    Ok(rocket::custom(&config)
        .mount("/", rocket::routes![healthz, readyz, livez, metrics_text])
        .manage(recorder))
}
