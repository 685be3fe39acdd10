use std::{net::SocketAddr, path::PathBuf};

use clap::{Parser, Subcommand};
use clap_handler::{handler, Handler};
use nagare::relay::{send_files, RelayReceiver};

#[derive(Subcommand, Clone, Handler)]
pub enum RelayCommand {
    Receive(ReceiveCommand),
    Send(SendCommand),
}

/// Stores the files of one capture device connection as raw_{index}.h264
#[derive(Parser, Clone, Debug)]
#[clap(name = "receive")]
pub struct ReceiveCommand {
    /// Address to listen on
    #[clap(short, long, default_value = "0.0.0.0:5000")]
    pub listen: SocketAddr,

    /// Directory received files are written to
    #[clap(short, long, default_value = ".")]
    pub dir: PathBuf,
}

#[handler(ReceiveCommand)]
pub async fn receive(me: ReceiveCommand) -> anyhow::Result<()> {
    let receiver = RelayReceiver::bind(me.listen, me.dir).await?;
    log::info!("Listening on {}", receiver.local_addr()?);

    let files = receiver.receive().await?;
    log::info!("Received {} files", files.len());
    Ok(())
}

/// Sends files in order over a single connection
#[derive(Parser, Clone, Debug)]
#[clap(name = "send")]
pub struct SendCommand {
    /// Address of the receiving server
    #[clap(short, long)]
    pub connect: String,

    pub files: Vec<PathBuf>,
}

#[handler(SendCommand)]
pub async fn send(me: SendCommand) -> anyhow::Result<()> {
    send_files(me.connect.as_str(), &me.files[..]).await?;
    log::info!("Sent {} files", me.files.len());
    Ok(())
}
