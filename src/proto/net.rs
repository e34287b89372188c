//! Deadline-wrapped socket helpers
//!
//! Every read and write in the system goes through these so no connection
//! can pin a task indefinitely.

use crate::common::{Error, Result};
use crate::proto::frame::MsgType;
use crate::proto::message;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tokio::net::TcpStream;

/// Connect with a bounded deadline
pub async fn connect(addr: &str, deadline: Duration) -> Result<TcpStream> {
    match tokio::time::timeout(deadline, TcpStream::connect(addr)).await {
        Err(_) => Err(Error::Timeout(format!("connect to {}", addr))),
        Ok(Err(e)) => Err(Error::Connection {
            addr: addr.to_string(),
            reason: e.to_string(),
        }),
        Ok(Ok(stream)) => Ok(stream),
    }
}

/// Send one message with a bounded deadline
pub async fn send_timed<T: Serialize>(
    stream: &mut TcpStream,
    msg_type: MsgType,
    msg: &T,
    deadline: Duration,
) -> Result<()> {
    tokio::time::timeout(deadline, message::send(stream, msg_type, msg))
        .await
        .map_err(|_| Error::Timeout(format!("send {:?}", msg_type)))?
}

/// Receive one message of a required type with a bounded deadline
pub async fn recv_timed<T: DeserializeOwned>(
    stream: &mut TcpStream,
    expect: MsgType,
    deadline: Duration,
) -> Result<T> {
    tokio::time::timeout(deadline, message::recv_expect(stream, expect))
        .await
        .map_err(|_| Error::Timeout(format!("recv {:?}", expect)))?
}

/// One-shot request/response over a fresh connection
pub async fn request<Req, Resp>(
    addr: &str,
    req_type: MsgType,
    req: &Req,
    resp_type: MsgType,
    deadline: Duration,
) -> Result<Resp>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    let mut stream = connect(addr, deadline).await?;
    send_timed(&mut stream, req_type, req, deadline).await?;
    recv_timed(&mut stream, resp_type, deadline).await
}
