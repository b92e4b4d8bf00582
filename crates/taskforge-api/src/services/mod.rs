// Services layer: request lifecycle and replay buffers

pub mod registry;
pub mod run;

pub use registry::{RequestRegistry, SharedBuilder};
pub use run::{packet_stream, start_run};
