//! Wire protocol shared by the coordinator, storage servers and clients

pub mod frame;
pub mod message;
pub mod net;

pub use frame::{read_frame, write_frame, MsgType, MAX_FRAME_LEN};
pub use message::{check_error, decode, encode, recv_expect, send};
