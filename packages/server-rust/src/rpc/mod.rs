//! Caller-side RPC: request construction, reply handling, and the service
//! proxy.

pub mod handler;
pub mod proxy;
pub mod request;

pub use handler::{
    MultiValueHandler, RpcResponseConverter, RpcReturnValueHandler, SingleValueHandler,
};
pub use proxy::{RpcServiceProxy, RpcStreamCall};
pub use request::RpcRequest;
