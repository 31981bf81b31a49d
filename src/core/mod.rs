// Core modules implementing wire framing, transport, shape checks and error modeling.
pub mod error;
pub mod frame;
pub mod shape;
pub mod transport;
