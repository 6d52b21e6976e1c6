//! Terminal styling

use colored::Colorize;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Span;

/// Kinds of text a [`Theme`] styles in the live view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Check,
    PhaseName,
    PhaseTime,
    Prefix,
    Faint,
    Highlight,
}

/// Immutable set of styles, built once and handed to renderers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    enabled: bool,
}

impl Theme {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Theme that never emits escape codes
    pub fn plain() -> Self {
        Self { enabled: false }
    }

    /// Colour when `is_terminal` and `NO_COLOR` is unset
    pub fn detect(is_terminal: bool) -> Self {
        let no_color = std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty());
        Self::new(is_terminal && !no_color)
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn check(&self) -> String {
        self.paint("✓", |s| s.green().bold().to_string())
    }

    pub fn cross(&self) -> String {
        self.paint("✗", |s| s.red().bold().to_string())
    }

    pub fn phase_name(&self, text: &str) -> String {
        self.paint(text, |s| s.bold().to_string())
    }

    pub fn phase_time(&self, text: &str) -> String {
        self.paint(text, |s| s.bright_black().to_string())
    }

    pub fn prefix(&self, text: &str) -> String {
        self.paint(text, |s| s.cyan().to_string())
    }

    pub fn faint(&self, text: &str) -> String {
        self.paint(text, |s| s.dimmed().to_string())
    }

    pub fn error(&self, text: &str) -> String {
        self.paint(text, |s| s.red().to_string())
    }

    pub fn warning(&self, text: &str) -> String {
        self.paint(text, |s| s.yellow().to_string())
    }

    pub fn highlight(&self, text: &str) -> String {
        self.paint(text, |s| s.bold().cyan().to_string())
    }

    /// Style of `role` for widgets drawn by the live view
    pub fn style(&self, role: Role) -> Style {
        if !self.enabled {
            return Style::default();
        }
        match role {
            Role::Check => Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            Role::PhaseName => Style::default().add_modifier(Modifier::BOLD),
            Role::PhaseTime => Style::default().fg(Color::DarkGray),
            Role::Prefix => Style::default().fg(Color::Cyan),
            Role::Faint => Style::default().add_modifier(Modifier::DIM),
            Role::Highlight => Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        }
    }

    pub fn span(&self, text: impl Into<String>, role: Role) -> Span<'static> {
        Span::styled(text.into(), self.style(role))
    }

    fn paint(&self, text: &str, style: impl FnOnce(&str) -> String) -> String {
        if self.enabled {
            style(text)
        } else {
            text.to_string()
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::plain()
    }
}
