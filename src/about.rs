use phamrecon_protocol::PROTOCOL_VERSION;

pub const PHAMRECON_VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn version_cli_text() -> String {
    format!(
        "phamrecon {}\nReport protocol {}\nPhage genome annotation import and reconciliation",
        PHAMRECON_VERSION, PROTOCOL_VERSION
    )
}
