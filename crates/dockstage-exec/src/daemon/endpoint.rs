use std::fmt;
#[cfg(unix)]
use std::path::PathBuf;

use tokio::net::TcpStream;

/// Socket on which the daemon serves its API once it is up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DaemonEndpoint {
    #[cfg(unix)]
    Unix(PathBuf),
    Tcp(String),
}

impl DaemonEndpoint {
    /// Default daemon socket.
    #[cfg(unix)]
    pub fn default_socket() -> Self {
        DaemonEndpoint::Unix(PathBuf::from("/var/run/docker.sock"))
    }

    /// Value for the daemon's `-H` flag.
    pub fn host_arg(&self) -> String {
        match self {
            #[cfg(unix)]
            DaemonEndpoint::Unix(path) => format!("unix://{}", path.display()),
            DaemonEndpoint::Tcp(addr) => format!("tcp://{addr}"),
        }
    }

    /// Returns `true` if a connection to the endpoint can be established right now.
    pub async fn accepts(&self) -> bool {
        match self {
            #[cfg(unix)]
            DaemonEndpoint::Unix(path) => tokio::net::UnixStream::connect(path).await.is_ok(),
            DaemonEndpoint::Tcp(addr) => TcpStream::connect(addr.as_str()).await.is_ok(),
        }
    }
}

impl fmt::Display for DaemonEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.host_arg())
    }
}
