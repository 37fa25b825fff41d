use clap::{Arg, ArgAction, ArgMatches, Command};
use std::process;
use std::sync::Arc;
use verge_profiles_lib::backend::LocalBackend;
use verge_profiles_lib::controller::{ItemEvent, MenuAction};
use verge_profiles_lib::events::{BroadcastEmitter, LogNotice};
use verge_profiles_lib::profile::display::{now_secs, ProfileCard};
use verge_profiles_lib::session::AppSession;
use verge_profiles_lib::settings_manager::{SettingsManager, SettingsPatch};
use verge_profiles_lib::update_coordinator::{UpdateMode, UpdateOutcome};

fn cli() -> Command {
  Command::new("profilectl")
    .about("Manage proxy profiles")
    .version(env!("BUILD_VERSION"))
    .subcommand_required(true)
    .subcommand(Command::new("list").about("List profiles in order"))
    .subcommand(
      Command::new("update")
        .about("Re-fetch a remote profile")
        .arg(Arg::new("uid").required(true))
        .arg(
          Arg::new("mode")
            .long("mode")
            .value_parser(["direct", "configured", "proxy"])
            .default_value("configured")
            .help("How to route the fetch"),
        ),
    )
    .subcommand(
      Command::new("delete")
        .about("Delete a profile")
        .arg(Arg::new("uid").required(true))
        .arg(
          Arg::new("yes")
            .long("yes")
            .action(ArgAction::SetTrue)
            .help("Confirm the deletion"),
        ),
    )
    .subcommand(
      Command::new("select")
        .about("Make a profile current")
        .arg(Arg::new("uid").required(true)),
    )
    .subcommand(
      Command::new("reorder")
        .about("Move a profile to a new position")
        .arg(Arg::new("uid").required(true))
        .arg(
          Arg::new("index")
            .required(true)
            .value_parser(clap::value_parser!(usize)),
        ),
    )
    .subcommand(Command::new("reactivate").about("Re-apply the active configuration"))
    .subcommand(
      Command::new("import")
        .about("Import a subscription url")
        .arg(Arg::new("url").required(true))
        .arg(Arg::new("name").long("name").help("Display name")),
    )
    .subcommand(
      Command::new("settings")
        .about("Show or change settings")
        .arg(
          Arg::new("keep-ui-active")
            .long("keep-ui-active")
            .value_parser(clap::value_parser!(bool)),
        )
        .arg(
          Arg::new("mixed-port")
            .long("mixed-port")
            .value_parser(clap::value_parser!(u16)),
        ),
    )
}

fn print_list(cards: &[(ProfileCard, &'static str)]) {
  for (card, marker) in cards {
    let usage = card.usage.as_deref().unwrap_or("-");
    println!(
      "{marker} {:<14} {:<24} {:<20} {:<10} {usage} (expires {})",
      card.uid, card.name, card.subtitle, card.updated_label, card.expire
    );
  }
}

async fn run(session: Arc<AppSession>, backend: Arc<LocalBackend>, matches: ArgMatches) -> Result<(), String> {
  match matches.subcommand() {
    Some(("list", _)) => {
      let snapshot = session
        .store()
        .current_snapshot()
        .await
        .map_err(|e| e.to_string())?;
      let now = now_secs();
      let cards: Vec<_> = snapshot
        .items
        .iter()
        .map(|record| {
          let marker = if snapshot.current.as_deref() == Some(record.uid.as_str()) {
            "*"
          } else if snapshot.chain.contains(&record.uid) {
            "+"
          } else {
            " "
          };
          (ProfileCard::build(record, now), marker)
        })
        .collect();
      print_list(&cards);
      Ok(())
    }
    Some(("update", sub)) => {
      let uid = sub.get_one::<String>("uid").cloned().unwrap_or_default();
      let mode: UpdateMode = sub
        .get_one::<String>("mode")
        .map(String::as_str)
        .unwrap_or("configured")
        .parse()?;
      match session.item(&uid).update(mode).await.map_err(|e| e.to_string())? {
        ItemEvent::Update(UpdateOutcome::Updated) => Ok(()),
        ItemEvent::Update(UpdateOutcome::Failed(e)) => Err(e.to_string()),
        other => Err(format!("unexpected result {other:?}")),
      }
    }
    Some(("delete", sub)) => {
      let uid = sub.get_one::<String>("uid").cloned().unwrap_or_default();
      let item = session.item(&uid);
      let ItemEvent::ConfirmDelete { title, message } = item
        .dispatch(MenuAction::Delete)
        .await
        .map_err(|e| e.to_string())?
      else {
        return Err("delete could not be started".to_string());
      };
      if !sub.get_flag("yes") {
        item.cancel_delete().map_err(|e| e.to_string())?;
        return Err(format!("{title}: {message}. Pass --yes to delete {uid}"));
      }
      item.confirm_delete().await.map_err(|e| e.to_string())?;
      Ok(())
    }
    Some(("select", sub)) => {
      let uid = sub.get_one::<String>("uid").cloned().unwrap_or_default();
      session.select(&uid, true).await.map_err(|e| e.to_string())
    }
    Some(("reorder", sub)) => {
      let uid = sub.get_one::<String>("uid").cloned().unwrap_or_default();
      let index = sub.get_one::<usize>("index").copied().unwrap_or_default();
      let order = session
        .store()
        .move_to(&uid, index)
        .await
        .map_err(|e| e.to_string())?;
      log::info!("New order: {}", order.join(", "));
      Ok(())
    }
    Some(("reactivate", _)) => session
      .reactivate()
      .await
      .map(|_| ())
      .map_err(|e| e.to_string()),
    Some(("import", sub)) => {
      let url = sub.get_one::<String>("url").cloned().unwrap_or_default();
      let name = sub.get_one::<String>("name").cloned();
      let record = backend
        .import_remote(&url, name, None)
        .await
        .map_err(|e| e.to_string())?;
      session.store().invalidate().await.map_err(|e| e.to_string())?;
      println!("{}", record.uid);
      Ok(())
    }
    Some(("settings", sub)) => {
      let patch = SettingsPatch {
        enable_keep_ui_active: sub.get_one::<bool>("keep-ui-active").copied(),
        mixed_port: sub.get_one::<u16>("mixed-port").copied(),
        ..Default::default()
      };
      let settings = session
        .settings()
        .patch_settings(patch)
        .map_err(|e| e.to_string())?;
      let json = serde_json::to_string_pretty(&settings).map_err(|e| e.to_string())?;
      println!("{json}");
      Ok(())
    }
    _ => Err("unknown command".to_string()),
  }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

  let matches = cli().get_matches();

  let (emitter, rx) = BroadcastEmitter::with_capacity(64);

  let settings = Arc::new(SettingsManager::new());
  let backend = Arc::new(LocalBackend::with_default_dirs(
    settings.clone(),
    Arc::new(emitter),
  ));
  let session = Arc::new(AppSession::new(
    backend.clone(),
    Arc::new(LogNotice),
    settings,
  ));
  let _listener = session.event_router().listen(rx);

  if let Err(e) = run(session, backend, matches).await {
    eprintln!("{e}");
    process::exit(1);
  }
}
