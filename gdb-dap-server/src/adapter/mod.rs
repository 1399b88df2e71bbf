pub mod codec;
pub mod dap_types;
pub mod protocol;
