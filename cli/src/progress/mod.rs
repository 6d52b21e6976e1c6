//! Progress signals and their presentation
//!
//! The submission side publishes into a [`ProgressHub`]; a [`Presenter`]
//! consumes the matching [`PresentationFeeds`] on its own task.

pub mod explain;
pub mod interactive;
pub mod mailbox;
pub mod phase;
pub mod printer;
pub mod reader;
pub mod theme;
pub mod transfer;

use async_trait::async_trait;
use deploy_api::models::SolveStatus;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::errors::CliError;
use mailbox::{LatestReceiver, LatestSender, MailboxSender, Overflow};
use phase::PhaseSummary;
use reader::UploadSample;
use transfer::TransferTable;

/// Producer side of every progress channel
#[derive(Debug, Clone)]
pub struct ProgressHub {
    pub activity: LatestSender<String>,
    pub upload: LatestSender<UploadSample>,
    pub transfers: LatestSender<TransferTable>,
    pub phases: LatestSender<Vec<PhaseSummary>>,
    pub statuses: MailboxSender<SolveStatus>,
}

/// Consumer side of every progress channel
#[derive(Debug)]
pub struct PresentationFeeds {
    pub activity: LatestReceiver<String>,
    pub upload: LatestReceiver<UploadSample>,
    pub transfers: LatestReceiver<TransferTable>,
    pub phases: LatestReceiver<Vec<PhaseSummary>>,
    pub statuses: mpsc::Receiver<SolveStatus>,
}

/// Create the channels between submission and presentation
pub fn channels(status_capacity: usize, status_overflow: Overflow) -> (ProgressHub, PresentationFeeds) {
    let (activity_tx, activity_rx) = mailbox::latest();
    let (upload_tx, upload_rx) = mailbox::latest();
    let (transfers_tx, transfers_rx) = mailbox::latest();
    let (phases_tx, phases_rx) = mailbox::latest();
    let (statuses_tx, statuses_rx) = mailbox::bounded(status_capacity, status_overflow);
    (
        ProgressHub {
            activity: activity_tx,
            upload: upload_tx,
            transfers: transfers_tx,
            phases: phases_tx,
            statuses: statuses_tx,
        },
        PresentationFeeds {
            activity: activity_rx,
            upload: upload_rx,
            transfers: transfers_rx,
            phases: phases_rx,
            statuses: statuses_rx,
        },
    )
}

/// Cancellation handles given to a presenter
#[derive(Debug, Clone)]
pub struct PresentationControl {
    /// Operation token; the presenter cancels it on interrupt or stall
    pub op: CancellationToken,
    /// Cancelled by the orchestrator once the submission is over
    pub done: CancellationToken,
}

/// How the presentation ended
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PresentationOutcome {
    /// The user pressed Ctrl+C
    pub interrupted: bool,
    /// The build never started moving within the stall window
    pub timed_out: bool,
}

/// Live display of a deploy
#[async_trait]
pub trait Presenter: Send {
    /// Policy for the status mailbox feeding this presenter
    fn status_overflow(&self) -> Overflow;

    /// Run until `control.done` or until the presenter ends the operation
    async fn present(
        self: Box<Self>,
        feeds: PresentationFeeds,
        control: PresentationControl,
    ) -> Result<PresentationOutcome, CliError>;
}
