//! PostgreSQL startup constants

/// PostgreSQL protocol version 3.0 (major=3, minor=0)
/// Encoded as (major << 16) | minor = 196608
pub const PROTOCOL_VERSION_3_0: u32 = 196608;

/// SSL request code - sent instead of StartupMessage to request SSL
/// Value: 80877103 (0x04D2162F)
pub const SSL_REQUEST_CODE: u32 = 80877103;

/// Cancel request code - sent to cancel a running query
/// Value: 80877102 (0x04D2162E)
pub const CANCEL_REQUEST_CODE: u32 = 80877102;

/// GSSAPI encryption request code
/// Value: 80877104 (0x04D21630)
pub const GSSENC_REQUEST_CODE: u32 = 80877104;

/// Smallest startup packet: length (4) + code (4)
pub const MIN_STARTUP_LENGTH: u32 = 8;

/// Largest startup packet the server accepts (`MAX_STARTUP_PACKET_LENGTH`)
pub const MAX_STARTUP_LENGTH: u32 = 10000;

/// Reply to an SSLRequest: proceed with the TLS handshake
pub const SSL_ACCEPTED: u8 = b'S';

/// Reply to any other startup message: no SSL
pub const SSL_REJECTED: u8 = b'N';
