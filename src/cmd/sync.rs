//! Reconciliation command: scan the corpus and sync it to the remote store.

use std::{path::PathBuf, sync::Arc};

use console::style;
use indicatif::ProgressBar;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::{
   Result, config,
   corpus::LocalCorpus,
   gateway::{GatewayLimits, UploadGateway},
   index::SyncIndex,
   reconcile::{ReconcileOptions, Reconciler, SyncReport},
   remote_http::HttpRemote,
};

#[derive(Serialize)]
struct SyncJson<'a> {
   schema_version: u32,
   dry_run:        bool,
   report:         &'a SyncReport,
}

pub async fn execute(
   path: Option<PathBuf>,
   dry_run: bool,
   revalidate: bool,
   json: bool,
) -> Result<()> {
   let cfg = config::get();
   config::validate(cfg)?;

   let root = path.unwrap_or_else(|| cfg.corpus_dir.clone());

   let remote = Arc::new(HttpRemote::from_config(cfg)?);
   let gateway = UploadGateway::new(Arc::clone(&remote), GatewayLimits::from_config(cfg));
   let reconciler = Reconciler::new(LocalCorpus::new(), remote, gateway);

   let mut index = SyncIndex::load(&config::index_path())?;

   let mut options = ReconcileOptions::from_config(cfg);
   options.dry_run = dry_run;
   options.revalidate = options.revalidate || revalidate;

   // A pass must stay cancellable between decisions; Ctrl-C stops issuing
   // new uploads while letting in-flight ones complete and be recorded.
   let cancel = CancellationToken::new();
   let signal_token = cancel.clone();
   tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
         tracing::warn!("cancellation requested, finishing in-flight uploads");
         signal_token.cancel();
      }
   });

   let report = if json {
      reconciler
         .run(&root, &mut index, &options, &cancel, &mut ())
         .await?
   } else {
      let mut bar = ProgressBar::new(0);
      let report = reconciler
         .run(&root, &mut index, &options, &cancel, &mut bar)
         .await?;
      bar.finish_and_clear();
      report
   };

   if json {
      let out = SyncJson { schema_version: 1, dry_run, report: &report };
      println!("{}", serde_json::to_string_pretty(&out)?);
      return Ok(());
   }

   if dry_run {
      println!(
         "{} {} document(s) would be uploaded",
         style("dry-run:").bold(),
         report.left_pending
      );
   }

   println!(
      "{} scanned {} ({} distinct), reused {}, uploaded {}, already synced {}",
      style("sync:").bold().green(),
      report.scanned,
      report.distinct,
      report.reused,
      report.uploaded,
      report.already_synced,
   );

   if report.unreadable > 0 {
      println!("{} {} unreadable file(s) excluded", style("warning:").yellow(), report.unreadable);
   }
   if report.left_pending > 0 {
      println!(
         "{} {} document(s) left pending for the next pass",
         style("warning:").yellow(),
         report.left_pending
      );
   }
   if report.newly_rejected > 0 {
      println!(
         "{} {} document(s) permanently rejected by the remote store",
         style("error:").red(),
         report.newly_rejected
      );
   }
   for failure in &report.failures {
      println!(
         "  {} {}: {}",
         style("failed").red(),
         failure.display_name,
         failure.error
      );
   }
   if report.cancelled {
      println!("{} pass cancelled before completion", style("warning:").yellow());
   }

   Ok(())
}
