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

//! Per-request options.
//!
//! ## Purpose
//! Every session request carries an [`Options`] value naming the target
//! application group and its tuning. Requests that cannot be satisfied
//! immediately are parked on a wait list, so the pool must be able to take
//! a self-contained copy of the options: [`Options::persist`] deep-copies
//! the value and detaches it from any external analytics transaction, whose
//! lifetime is controlled by the analytics collaborator rather than by the
//! pool.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Handle to an externally managed analytics transaction.
///
/// The pool never interprets this; it only makes sure the handle does not
/// outlive the request it belongs to (wait-list copies are detached).
#[derive(Debug)]
pub struct AnalyticsTxn {
    /// Opaque transaction id assigned by the analytics collector.
    pub txn_id: String,
    /// Collector-defined category, e.g. `"requests"`.
    pub category: String,
}

/// Tuning for one session request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Options {
    /// Name of the application group the session is requested for.
    pub app_group_name: String,

    /// Filesystem root of the application.
    pub app_root: String,

    /// Lower bound on the number of workers the group tries to keep
    /// attached. Forced to zero when the pool prepares for shutdown.
    #[serde(default = "default_min_processes")]
    pub min_processes: u32,

    /// A noop request never spawns, parks, or occupies a worker; it exists
    /// so callers can touch a group without consuming capacity.
    #[serde(default)]
    pub noop: bool,

    /// External analytics transaction attached to the originating request.
    #[serde(skip)]
    pub analytics_txn: Option<Arc<AnalyticsTxn>>,
}

fn default_min_processes() -> u32 {
    1
}

impl Options {
    /// Options for `app_group_name` with defaults for everything else.
    pub fn for_app_group(app_group_name: impl Into<String>) -> Self {
        let app_group_name = app_group_name.into();
        Self {
            app_root: format!("/var/www/{app_group_name}"),
            app_group_name,
            min_processes: default_min_processes(),
            noop: false,
            analytics_txn: None,
        }
    }

    /// Deep copy suitable for long-term storage on a wait list, detached
    /// from the external analytics transaction.
    pub fn persist(&self) -> Self {
        let mut copy = self.clone();
        copy.analytics_txn = None;
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persist_detaches_analytics_txn() {
        let mut options = Options::for_app_group("shop");
        options.analytics_txn = Some(Arc::new(AnalyticsTxn {
            txn_id: "txn-1".to_string(),
            category: "requests".to_string(),
        }));

        let persisted = options.persist();
        assert!(persisted.analytics_txn.is_none());
        assert_eq!(persisted.app_group_name, "shop");
        assert_eq!(persisted.min_processes, 1);
        // The original keeps its transaction.
        assert!(options.analytics_txn.is_some());
    }

    #[test]
    fn deserializes_with_defaults() {
        let options: Options =
            serde_json::from_str(r#"{"app_group_name":"shop","app_root":"/srv/shop"}"#).unwrap();
        assert_eq!(options.min_processes, 1);
        assert!(!options.noop);
    }
}
