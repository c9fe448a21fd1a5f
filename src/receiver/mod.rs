pub mod acceptance;
pub mod queue;
pub mod source;
pub mod work;

pub use acceptance::AcceptancePolicy;
pub use queue::{CatalystHistory, CatalystQueue};
pub use source::{
    CatalystSource, SimulatedField, SimulatedSource, default_simulated_fields, validate_item,
};
pub use work::{ProcessorWork, ReceiverStats, ReceiverWork, SharedReceiverStats};
