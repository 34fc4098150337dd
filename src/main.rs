use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyEventKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

mod actions;
mod app;
mod config;
mod desktop;
mod kanban;
mod launch;
mod workers;

use actions::Action;
use app::App;
use config::Settings;
use desktop::PowerShellDesktop;
use kanban::KanbanClient;
use workers::injector::CommandInjector;
use workers::registry::WindowRegistry;
use workers::sync::{SyncHooks, SyncLoop};
use workers::Worker;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load()?;
    // First run: write the defaults so users have a file to edit.
    if !Settings::config_path()?.exists() {
        settings.save().context("failed to write default config")?;
    }

    // Initialize logging. Logs go to a file: stderr would fight the TUI for
    // the terminal.
    let log_dir = Settings::config_dir()?;
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create {}", log_dir.display()))?;
    let log_file = std::fs::File::create(log_dir.join("agent-deck.log"))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .init();

    // Create event channel
    let (tx, mut rx) = mpsc::unbounded_channel::<Action>();

    let desktop = Arc::new(
        PowerShellDesktop::new()
            .context("agent-deck drives the Windows desktop accessibility tree")?,
    );

    // Observer hooks bridge the sync thread into the action channel
    let update_tx = tx.clone();
    let buffer_tx = tx.clone();
    let hooks = SyncHooks {
        on_update: Box::new(move || {
            let _ = update_tx.send(Action::WorkersUpdated);
        }),
        on_buffer: Box::new(move |handle, element_id, text| {
            let _ = buffer_tx.send(Action::BufferCaptured(
                handle,
                element_id.clone(),
                text.to_string(),
            ));
        }),
    };

    // Start the background sync loop; a failed accessibility init aborts
    // startup here instead of dying silently in the background.
    let mut sync = SyncLoop::start(Arc::clone(&desktop), settings.clone(), hooks)?;

    // User-triggered paths share the same desktop but run off the UI thread
    let injector = Arc::new(CommandInjector::new(
        Arc::clone(&desktop),
        Duration::from_millis(settings.sync.settle_ms),
    ));
    let picker_registry = Arc::new(WindowRegistry::new(
        Arc::clone(&desktop),
        settings.capture.clone(),
    ));

    // Spawn task-board poller
    if settings.kanban.enabled {
        let kanban_tx = tx.clone();
        let kanban_settings = settings.kanban.clone();
        tokio::spawn(async move {
            let Some(project) = kanban_settings.project.clone() else {
                tracing::warn!("kanban polling enabled but no project configured");
                return;
            };
            let client = KanbanClient::new(&kanban_settings);
            let mut project_id: Option<String> = None;
            loop {
                if project_id.is_none() {
                    project_id = match client.resolve_project_id(&project).await {
                        Ok(id) => id,
                        Err(err) => {
                            tracing::debug!("task board project lookup failed: {err}");
                            None
                        }
                    };
                }
                if let Some(id) = &project_id {
                    match client.tasks(id).await {
                        Ok(tasks) => {
                            let _ = kanban_tx
                                .send(Action::AssignmentsUpdated(kanban::assignments(&tasks)));
                        }
                        Err(err) => tracing::debug!("task poll failed: {err}"),
                    }
                }
                tokio::time::sleep(Duration::from_millis(kanban_settings.poll_ms)).await;
            }
        });
    }

    // Initialize terminal
    let mut terminal = ratatui::init();

    // Spawn input handler
    let input_tx = tx.clone();
    tokio::spawn(async move {
        loop {
            if event::poll(Duration::from_millis(100)).unwrap_or(false) {
                if let Ok(evt) = event::read() {
                    if let Event::Key(key) = evt {
                        if key.kind == KeyEventKind::Press {
                            let _ = input_tx.send(Action::KeyPress(key));
                        }
                    }
                }
            }
        }
    });

    // Create app state
    let mut app = App::new();

    // Main event loop
    let result = loop {
        // Render
        terminal.draw(|f| app.render(f))?;

        // Process any pending actions from the app
        for pending_action in app.take_pending_actions() {
            match pending_action {
                Action::SendCommand(serial, command) => {
                    let target = sync
                        .workers()
                        .into_iter()
                        .find(|w| w.serial == serial)
                        .and_then(|w| w.handle);
                    match target {
                        Some(handle) => {
                            let injector = Arc::clone(&injector);
                            let reply = tx.clone();
                            tokio::task::spawn_blocking(move || {
                                if !injector.send(handle, &command) {
                                    let _ = reply
                                        .send(Action::Error("Command injection failed".to_string()));
                                }
                            });
                        }
                        None => {
                            app.error_message = Some("Worker has no window yet".to_string());
                        }
                    }
                }
                Action::SpawnWorker(ref role) => match launch::launch_worker(&settings.launch, role) {
                    Ok(title) => {
                        let mut worker = Worker::new(title, role.clone());
                        if let Some(path) = settings.launch.project_path.clone() {
                            worker = worker.with_project(path);
                        }
                        sync.add_worker(worker);
                        app.set_workers(sync.workers());
                    }
                    Err(e) => {
                        app.error_message = Some(format!("Failed to spawn: {}", e));
                    }
                },
                Action::ConnectWindow(ref entry) => {
                    let mut worker = Worker::new(entry.display_name.clone(), "manual");
                    worker.assign_identity(entry.handle, entry.element_id.clone());
                    sync.add_worker(worker);
                    app.set_workers(sync.workers());
                }
                Action::DisconnectWorker(serial) => {
                    if sync.remove_worker(serial).is_some() {
                        app.set_workers(sync.workers());
                    }
                }
                Action::RefreshWindows => {
                    let registry = Arc::clone(&picker_registry);
                    let reply = tx.clone();
                    tokio::task::spawn_blocking(move || match registry.list_windows() {
                        Ok(entries) => {
                            let _ = reply.send(Action::WindowsListed(entries));
                        }
                        Err(err) => {
                            let _ = reply.send(Action::Error(format!("Enumeration failed: {}", err)));
                        }
                    });
                }
                Action::CopyBuffer => match app.mirror_text().map(str::to_string) {
                    Some(text) => {
                        match arboard::Clipboard::new() {
                            Ok(mut clipboard) => {
                                if let Err(e) = clipboard.set_text(&text) {
                                    app.error_message = Some(format!("Clipboard error: {}", e));
                                } else {
                                    app.error_message =
                                        Some("Buffer copied to clipboard!".to_string());
                                }
                            }
                            Err(e) => {
                                app.error_message = Some(format!("Clipboard error: {}", e));
                            }
                        }
                    }
                    None => {
                        app.error_message = Some("Nothing captured yet".to_string());
                    }
                },
                _ => {}
            }
        }

        // Handle events from channel
        tokio::select! {
            Some(action) = rx.recv() => {
                match action {
                    Action::WorkersUpdated => {
                        app.set_workers(sync.workers());
                    }
                    action => match app.handle_action(action) {
                        Ok(should_quit) => {
                            if should_quit {
                                break Ok(());
                            }
                        }
                        Err(e) => {
                            break Err(e);
                        }
                    }
                }
            }
        }
    };

    // Stop the background loop (waits for the in-flight tick), then restore
    sync.stop();
    ratatui::restore();
    result
}
