//! Terminal user interface for the recording session.
//!
//! Shows a live waveform, the recording duration, pause state and upload
//! progress, and translates key presses into recording commands.

use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    style::{Color, Style},
    widgets::Sparkline,
};
use std::error::Error;
use std::io::{stdout, Stdout};
use std::time::{Duration, Instant};

use crate::recording::visualizations::{AmplitudeTracker, WaveformBuffer};

/// Target frame interval, roughly 60fps.
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// User input command during recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingCommand {
    /// Continue recording (no key pressed)
    Continue,
    /// Finish the recording and upload the remainder (Enter key)
    Stop,
    /// Pause/resume recording (Space key)
    TogglePause,
    /// Discard the recording (Escape, 'q' or Ctrl+C)
    Cancel,
}

/// Terminal UI for audio recording with waveform visualization.
pub struct RecordingTui {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    bars: WaveformBuffer,
    tracker: AmplitudeTracker,
    terminal_width: usize,
    last_frame: Instant,
}

impl RecordingTui {
    /// Creates a new TUI instance and enters alternate screen mode.
    ///
    /// # Errors
    /// - If terminal cannot be initialized
    /// - If raw mode cannot be enabled
    /// - If alternate screen cannot be entered
    pub fn new() -> Result<Self, Box<dyn Error>> {
        enable_raw_mode()?;
        let mut stdout = stdout();
        execute!(stdout, crossterm::terminal::EnterAlternateScreen)?;

        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;

        let size = terminal.size()?;
        let terminal_width = size.width as usize;

        Ok(RecordingTui {
            terminal,
            bars: WaveformBuffer::new(terminal_width),
            tracker: AmplitudeTracker::new(),
            terminal_width,
            last_frame: Instant::now() - FRAME_INTERVAL,
        })
    }

    /// Renders one frame: waveform, duration, pause indicator and upload
    /// progress. Frames are throttled; extra calls are cheap no-ops.
    ///
    /// # Errors
    /// - If terminal rendering fails
    pub fn render(
        &mut self,
        samples: &[i16],
        paused: bool,
        elapsed: Duration,
        uploaded_bytes: u64,
    ) -> Result<(), Box<dyn Error>> {
        if self.last_frame.elapsed() < FRAME_INTERVAL {
            return Ok(());
        }
        self.last_frame = Instant::now();

        let size = self.terminal.size()?;
        let current_width = size.width as usize;
        if current_width != self.terminal_width {
            self.bars.resize(current_width);
            self.terminal_width = current_width;
        }

        let amplitude = self.tracker.update(samples);
        // A paused waveform stays frozen on screen.
        if !paused {
            self.bars.push(amplitude);
        }

        let history: Vec<u64> = self
            .bars
            .ordered()
            .iter()
            .map(|&v| (v * 100.0) as u64)
            .collect();

        self.terminal.draw(|frame| {
            let area = frame.area();

            let footer_height = 1;

            let waveform_area = Rect {
                x: area.x,
                y: area.y,
                width: area.width,
                height: area.height.saturating_sub(footer_height),
            };

            let sparkline = Sparkline::default().data(&history).max(100).style(
                Style::default()
                    .bg(Color::Rgb(0, 0, 0))
                    .fg(Color::Rgb(206, 224, 220)),
            );

            frame.render_widget(sparkline, waveform_area);

            let footer_area = Rect {
                x: area.x,
                y: area.y + area.height.saturating_sub(footer_height),
                width: area.width,
                height: footer_height,
            };

            let indicator = if paused {
                Span::styled("⏸ ", Style::default().fg(Color::Yellow))
            } else {
                Span::styled("● ", Style::default().fg(Color::Red))
            };

            let duration_secs = elapsed.as_secs();
            let minutes = duration_secs / 60;
            let secs = duration_secs % 60;
            let duration_span = Span::raw(format!("{minutes}:{secs:02}"));

            let uploaded_span = Span::raw(format!(
                " / {:.1} MB uploaded",
                uploaded_bytes as f64 / (1024.0 * 1024.0)
            ));

            let help_span = Span::raw("   [space] pause  [enter] finish  [q] discard");

            let footer_line = Line::from(vec![indicator, duration_span, uploaded_span, help_span]);

            let footer = ratatui::widgets::Paragraph::new(footer_line).style(
                Style::default()
                    .fg(Color::Rgb(185, 207, 212))
                    .bg(Color::Rgb(0, 0, 0)),
            );

            frame.render_widget(footer, footer_area);
        })?;

        Ok(())
    }

    /// Renders a static frame shown while the tail of the upload finishes
    /// after the microphone has been released.
    ///
    /// # Errors
    /// - If terminal rendering fails
    pub fn render_processing(&mut self) -> Result<(), Box<dyn Error>> {
        self.terminal.draw(|frame| {
            let area = frame.area();
            let message = ratatui::widgets::Paragraph::new("Finishing upload...")
                .style(Style::default().fg(Color::Rgb(206, 224, 220)))
                .alignment(Alignment::Center);
            frame.render_widget(message, area);
        })?;
        Ok(())
    }

    /// Processes user input and returns the appropriate recording command.
    ///
    /// # Returns
    /// - `Continue` if no key or unrecognized key was pressed
    /// - `Stop` if Enter was pressed
    /// - `TogglePause` if Space was pressed
    /// - `Cancel` if Escape, 'q' or Ctrl+C was pressed
    ///
    /// # Errors
    /// - If event polling fails
    pub fn handle_input(&mut self) -> Result<RecordingCommand, Box<dyn Error>> {
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                return Ok(match key.code {
                    KeyCode::Enter => {
                        tracing::debug!("Enter pressed: finishing recording");
                        RecordingCommand::Stop
                    }
                    KeyCode::Char(' ') => {
                        tracing::debug!("Space pressed: toggling pause");
                        RecordingCommand::TogglePause
                    }
                    KeyCode::Char('q') | KeyCode::Esc => {
                        tracing::debug!("Escape or 'q' pressed: discarding recording");
                        RecordingCommand::Cancel
                    }
                    KeyCode::Char('c')
                        if key
                            .modifiers
                            .contains(crossterm::event::KeyModifiers::CONTROL) =>
                    {
                        tracing::debug!("Ctrl+C pressed: discarding recording");
                        RecordingCommand::Cancel
                    }
                    _ => RecordingCommand::Continue,
                });
            }
        }
        Ok(RecordingCommand::Continue)
    }

    /// Cleans up terminal state and exits alternate screen mode.
    ///
    /// # Errors
    /// - If terminal mode cannot be disabled
    /// - If cursor cannot be shown
    pub fn cleanup(&mut self) -> Result<(), Box<dyn Error>> {
        disable_raw_mode()?;
        execute!(
            self.terminal.backend_mut(),
            crossterm::terminal::LeaveAlternateScreen
        )?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}
