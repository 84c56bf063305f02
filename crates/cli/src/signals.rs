// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// A token cancelled on SIGINT, SIGTERM or SIGUSR1. SIGUSR1 is what a
/// session parent sends its child.
pub fn cancel_on_signals() -> std::io::Result<CancellationToken> {
    let token = CancellationToken::new();
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut user1 = signal(SignalKind::user_defined1())?;

    let cancel = token.clone();
    tokio::spawn(async move {
        loop {
            let name = tokio::select! {
                _ = interrupt.recv() => "SIGINT",
                _ = terminate.recv() => "SIGTERM",
                _ = user1.recv() => "SIGUSR1",
            };
            if cancel.is_cancelled() {
                tracing::warn!(signal = name, "already cleaning up, please wait");
            } else {
                tracing::info!(signal = name, "received signal, cleaning up ...");
                cancel.cancel();
            }
        }
    });
    Ok(token)
}
