//! Index status command.

use std::collections::HashSet;

use console::style;
use serde::Serialize;

use crate::{
   Result, config,
   index::{EntryState, StateCounts, SyncIndex},
   remote::{self, RemoteCatalog},
   remote_http::HttpRemote,
   util::format_size,
};

#[derive(Serialize)]
struct RejectedJson {
   names:  Vec<String>,
   hash:   String,
   reason: Option<String>,
}

#[derive(Serialize)]
struct RemoteDrift {
   catalog_handles: usize,
   /// Synced entries whose handle the catalog no longer lists.
   missing_remotely: usize,
}

#[derive(Serialize)]
struct StatusJson {
   schema_version: u32,
   index_path:     String,
   entries:        usize,
   counts:         StateCounts,
   last_pass_at:   Option<String>,
   last_pass_summary: Option<String>,
   rejected:       Vec<RejectedJson>,
   #[serde(skip_serializing_if = "Option::is_none")]
   remote:         Option<RemoteDrift>,
}

/// Compares the index's synced handles against a full catalog listing.
///
/// Listing is advisory (a missing handle is confirmed only by `resolve`
/// during a pass), but it gives the operator an early drift signal.
async fn check_remote_drift(index: &SyncIndex) -> Result<RemoteDrift> {
   let client = HttpRemote::from_config(config::get())?;
   let handles = remote::list_all(&client as &dyn RemoteCatalog).await?;
   let listed: HashSet<&str> = handles.iter().map(|h| h.id.as_str()).collect();

   let missing_remotely = index
      .entries()
      .filter(|e| e.state == EntryState::Synced)
      .filter_map(|e| e.handle.as_ref())
      .filter(|h| !listed.contains(h.id.as_str()))
      .count();

   Ok(RemoteDrift { catalog_handles: handles.len(), missing_remotely })
}

pub async fn execute(json: bool, remote: bool) -> Result<()> {
   let index_path = config::index_path();
   let index = SyncIndex::load(&index_path)?;
   let counts = index.state_counts();

   let drift = if remote {
      Some(check_remote_drift(&index).await?)
   } else {
      None
   };

   let rejected: Vec<RejectedJson> = index
      .entries()
      .filter(|e| e.state == EntryState::Rejected)
      .map(|e| RejectedJson {
         names:  e.names.iter().cloned().collect(),
         hash:   e.fingerprint.hash.to_string(),
         reason: e.rejected_reason.clone(),
      })
      .collect();

   if json {
      let out = StatusJson {
         schema_version: 1,
         index_path: index_path.display().to_string(),
         entries: index.len(),
         counts,
         last_pass_at: index.last_pass_at().map(ToString::to_string),
         last_pass_summary: index.last_pass_summary().map(ToString::to_string),
         rejected,
         remote: drift,
      };
      println!("{}", serde_json::to_string_pretty(&out)?);
      return Ok(());
   }

   println!("{} {}", style("index:").bold(), index_path.display());
   let size = std::fs::metadata(&index_path).map(|m| m.len()).unwrap_or(0);
   println!(
      "  {} entries ({}): {} synced, {} pending, {} stale, {} rejected",
      index.len(),
      format_size(size),
      counts.synced,
      counts.pending,
      counts.stale,
      counts.rejected,
   );

   match index.last_pass_at() {
      Some(at) => {
         println!("  last pass: {at}");
         if let Some(summary) = index.last_pass_summary() {
            println!("  {summary}");
         }
      },
      None => println!("  no reconciliation pass recorded"),
   }

   // Rejected documents need operator attention; surface them every time.
   for entry in &rejected {
      println!(
         "  {} {} ({})",
         style("rejected:").red(),
         entry.names.join(", "),
         entry.reason.as_deref().unwrap_or("no reason recorded"),
      );
   }

   if let Some(drift) = drift {
      println!(
         "  remote catalog: {} handle(s), {} synced entries not listed",
         drift.catalog_handles, drift.missing_remotely
      );
      if drift.missing_remotely > 0 {
         println!(
            "  {} run 'docsync sync --revalidate' to reconcile",
            style("hint:").cyan()
         );
      }
   }

   Ok(())
}
