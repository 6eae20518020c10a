// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>
//
// This file is part of PlexPool.
//
// PlexPool is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// PlexPool is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with PlexPool. If not, see <https://www.gnu.org/licenses/>.

//! One-shot completion tickets.
//!
//! Synchronous administrative operations (`get`, `detach_group_by_name`,
//! `disable_process`) register a callback and then need to wait for it to
//! fire. A ticket turns that callback into an awaitable completion: the
//! signal half travels into the callback, the ticket half stays with the
//! caller. Signalling after the caller gave up is safe, and waiting on a
//! signal that was dropped unfired resolves instead of hanging.

use tokio::sync::oneshot;

use plexpool_core::DisableResult;

/// Create a connected signal/ticket pair.
pub fn ticket<T>() -> (TicketSignal<T>, Ticket<T>) {
    let (tx, rx) = oneshot::channel();
    (TicketSignal { tx }, Ticket { rx })
}

/// The completing half of a ticket; moved into the completion callback.
pub struct TicketSignal<T> {
    tx: oneshot::Sender<T>,
}

impl<T> TicketSignal<T> {
    /// Deliver the result. A waiter that has already been cancelled is
    /// simply not notified; the value is dropped.
    pub fn complete(self, value: T) {
        let _ = self.tx.send(value);
    }
}

/// The waiting half of a ticket.
pub struct Ticket<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Ticket<T> {
    /// Wait for the signal. Returns `None` when the signal half was
    /// dropped without completing, which callers treat as an aborted
    /// operation.
    pub async fn wait(self) -> Option<T> {
        self.rx.await.ok()
    }
}

/// Ticket signalled once a group has finished shutting down.
pub type DetachGroupTicket = Ticket<()>;

/// Ticket carrying the eventual outcome of a deferred disable.
pub type DisableTicket = Ticket<DisableResult>;
