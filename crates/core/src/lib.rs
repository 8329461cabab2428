// Core types shared by tether peers and hosts: the wire protocol,
// capability catalogs and input schema validation.

pub mod catalog;
pub mod logging;
pub mod protocol;
pub mod schema;

pub use catalog::{Catalog, Keyed, ResourceDescriptor, ToolDescriptor};
pub use protocol::{
    CallResult, Capabilities, ErrorCode, InitializeResult, PeerInfo, RemoteFailure, Request,
    RequestBody, Response, MAX_FRAME_BYTES,
};
pub use schema::{FieldType, InputSchema, PropertySchema, SchemaError};
