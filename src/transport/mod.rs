// Transport module - THE LINK (abstract)
// Dual-path connectivity: WiFi and cellular behind one contract, plus the
// arbiter that chooses between them

mod arbiter;
mod cellular;
mod http;
mod traits;
mod wifi;

pub use traits::{
    // Core trait
    Transport,
    // Requests
    HttpMethod, HttpRequest, ResponseCallback,
    // State enums
    LinkState, RequestPhase,
    // Identity and errors
    TransportError, TransportKind,
};

pub use http::{
    chunked_terminator_seen, compose_request, decode_chunked, is_retryable_status, ParsedUrl,
    ResponseHead,
};

pub use cellular::{CellularTransport, Modem, RegistrationStatus, SimStatus};

pub use wifi::{HttpDriver, WifiStation, WifiTransport};

pub use arbiter::{ActiveLink, NetworkArbiter, TransportPreference};
