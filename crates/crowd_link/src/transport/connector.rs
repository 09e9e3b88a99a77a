use async_io::Async;
use futures_lite::io::{AsyncRead, AsyncWrite};
use std::{
    future::Future,
    io,
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    pin::Pin,
};

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Both halves of an open connection.
pub struct Stream {
    pub reader: BoxedReader,
    pub writer: BoxedWriter,
}

pub type ConnectFut = Pin<Box<dyn Future<Output = io::Result<Stream>> + Send>>;

/// Opens the byte stream a session runs over.
pub trait Connector: Send + Sync {
    fn connect(&self) -> ConnectFut;
}

/// Plain TCP to the chat server.
#[derive(Clone, Debug)]
pub struct TcpConnector {
    address: String,
}

impl TcpConnector {
    pub const TWITCH: &'static str = "irc.chat.twitch.tv:6667";

    pub fn twitch() -> Self {
        Self::new(Self::TWITCH)
    }

    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl Connector for TcpConnector {
    fn connect(&self) -> ConnectFut {
        let address = self.address.clone();
        Box::pin(async move {
            log::debug!("resolving {}", address);
            let addrs = blocking::unblock(move || {
                address
                    .to_socket_addrs()
                    .map(|addrs| addrs.collect::<Vec<SocketAddr>>())
            })
            .await?;

            let mut last = None;
            for addr in addrs {
                log::debug!("connecting to {}", addr);
                match Async::<TcpStream>::connect(addr).await {
                    Ok(stream) => {
                        let reader = Async::new(stream.get_ref().try_clone()?)?;
                        return Ok(Stream {
                            reader: Box::new(reader),
                            writer: Box::new(stream),
                        });
                    }
                    Err(err) => last = Some(err),
                }
            }

            Err(last.unwrap_or_else(|| {
                io::Error::new(io::ErrorKind::AddrNotAvailable, "address did not resolve")
            }))
        })
    }
}
