pub(crate) mod request;
pub(crate) mod response;
pub(crate) mod writer;

pub use request::{Body, Method, Request, UnknownMethod};
pub use response::Response;
pub use writer::{response_status, ObservableResponseWriter, ResponseWriter};
