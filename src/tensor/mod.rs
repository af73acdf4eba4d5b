mod data_type;
pub use data_type::DataType;
mod desc;
pub use desc::TensorDesc;
pub mod pool;
pub use pool::{PoolEntry, TensorPool};
mod state;
pub use state::TensorState;

/// Program-scoped tensor identifier, assigned by the producing compiler.
pub type TensorId = u32;
