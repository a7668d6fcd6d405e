//! The simulated CPE's parameter map: identity, data model and private session scratch state.

pub mod data_model;
pub mod identity;
pub mod model;

pub use data_model::{DataModelSource, DefaultDataModel};
pub use identity::DeviceIdentity;
pub use model::{Parameter, ParameterStore, XsdType};
