use clap::Subcommand;
use clap_handler::Handler;

mod play;
mod relay;

#[derive(Subcommand, Clone, Handler)]
pub enum NagareCommand {
    Play(play::PlayCommand),

    /// Moves raw capture files between the capture device and the fragment server
    #[clap(subcommand)]
    Relay(relay::RelayCommand),
}
