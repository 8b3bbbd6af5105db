//! The timer-driven training loop and its terminal display
//!
//! Each tick runs exactly one training step to completion, then the chart is redrawn.
//! Between ticks the loop waits on terminal input, so closing the display (`q`, `Esc`
//! or `Ctrl-C`) takes effect within one interval.

use std::{
    io::{self, stdout},
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal,
    backend::{Backend, CrosstermBackend},
};
use thiserror::Error;

use crate::{
    datasets::plot_fit,
    nn::NNError,
    trainer::{StepOutput, Trainer},
    ui::{self, FitView},
};

/// Errors that end the training loop
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Terminal error: {0}")]
    Io(#[from] io::Error),
    #[error("Training step failed: {0}")]
    Model(#[from] NNError),
    #[error("Failed to write plot '{file_name}': {reason}")]
    Plot { file_name: String, reason: String },
}

/// Where and how often to write PNG snapshots of the fit
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    pub output_dir: PathBuf,
    /// write a snapshot every this many steps
    pub every: usize,
}

impl SnapshotConfig {
    fn file_name(&self, step: usize) -> String {
        self.output_dir
            .join(format!("fit_step_{}.png", step))
            .to_string_lossy()
            .into_owned()
    }
}

/// Main application state
pub struct App {
    pub trainer: Trainer,
    pub view: FitView,
    pub tick_rate: Duration,
    pub snapshots: Option<SnapshotConfig>,
    pub should_quit: bool,
    last_output: Option<StepOutput>,
}

impl App {
    pub fn new(trainer: Trainer, tick_rate: Duration, snapshots: Option<SnapshotConfig>) -> Self {
        let view = FitView::new(trainer.dataset());
        Self {
            trainer,
            view,
            tick_rate,
            snapshots,
            should_quit: false,
            last_output: None,
        }
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    /// One training step, then refresh the chart state
    pub fn on_tick(&mut self) -> Result<(), RunError> {
        let out = self.trainer.step()?;
        self.view.update(self.trainer.dataset(), &out);
        if let Some(snapshots) = &self.snapshots {
            if snapshots.every > 0 && out.step % snapshots.every == 0 {
                self.write_snapshot(&out, snapshots)?;
            }
        }
        self.last_output = Some(out);
        Ok(())
    }

    /// Output of the most recent step, if any
    pub fn last_output(&self) -> Option<&StepOutput> {
        self.last_output.as_ref()
    }

    fn write_snapshot(&self, out: &StepOutput, snapshots: &SnapshotConfig) -> Result<(), RunError> {
        let file_name = snapshots.file_name(out.step);
        plot_fit(self.trainer.dataset(), &out.prediction, out.step, &file_name).map_err(|e| {
            RunError::Plot {
                file_name: file_name.clone(),
                reason: e.to_string(),
            }
        })
    }

    /// Writes the latest fit regardless of the snapshot period
    pub fn write_final_snapshot(&self) -> Result<(), RunError> {
        match (&self.snapshots, &self.last_output) {
            (Some(snapshots), Some(out)) => self.write_snapshot(out, snapshots),
            _ => Ok(()),
        }
    }
}

/// Handle a key event
pub fn handle_key_event(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => app.quit(),
        // raw mode swallows SIGINT
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => app.quit(),
        _ => {}
    }
}

fn ensure_output_dir(app: &App) -> Result<(), RunError> {
    if let Some(snapshots) = &app.snapshots {
        create_dir(&snapshots.output_dir)?;
    }
    Ok(())
}

fn create_dir(dir: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dir)?;
    log::info!("Writing snapshots to '{}'.", dir.display());
    Ok(())
}

/// Run the live display until the user closes it
///
/// # Errors
/// Returns an error if terminal initialization fails or a training step fails. The
/// terminal is restored in both cases.
pub fn run(app: &mut App) -> Result<(), RunError> {
    ensure_output_dir(app)?;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    log::info!("Display closed after {} steps.", app.trainer.steps());
    result?;
    app.write_final_snapshot()
}

/// Main application loop
fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<(), RunError> {
    let mut last_tick = Instant::now();
    loop {
        terminal.draw(|frame| ui::render(&app.view, frame))?;

        let timeout = app.tick_rate.saturating_sub(last_tick.elapsed());
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    handle_key_event(app, key);
                }
            }
        }

        if app.should_quit {
            return Ok(());
        }

        if last_tick.elapsed() >= app.tick_rate {
            app.on_tick()?;
            last_tick = Instant::now();
        }
    }
}

/// Train for a fixed number of steps without a display
pub fn run_headless(app: &mut App, steps: usize) -> Result<(), RunError> {
    ensure_output_dir(app)?;
    let log_every = (steps / 10).max(1);
    for _ in 0..steps {
        app.on_tick()?;
        if let Some(out) = app.last_output() {
            if out.step % log_every == 0 || out.step == steps {
                log::info!("step: {}, loss: {}", out.step, out.loss);
            }
        }
    }
    app.write_final_snapshot()
}
