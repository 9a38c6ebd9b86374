//! Semantic color palette, via owo-colors.

use std::fmt::Display;

use owo_colors::{OwoColorize, Style};

fn paint(value: &impl Display, style: Style) -> String {
    if super::no_color() {
        value.to_string()
    } else {
        value.style(style).to_string()
    }
}

/// Trait extension to apply semantic styles.
pub trait SemanticStyle {
    /// Green bold.
    fn success(&self) -> String;
    /// Red bold.
    fn error(&self) -> String;
    /// Yellow.
    fn warning(&self) -> String;
    /// Dimmed.
    fn muted(&self) -> String;
    /// Bold.
    fn header(&self) -> String;
    /// Blue; seeds, paths and commands.
    fn code(&self) -> String;
}

impl<T: Display> SemanticStyle for T {
    fn success(&self) -> String {
        paint(self, Style::new().green().bold())
    }

    fn error(&self) -> String {
        paint(self, Style::new().red().bold())
    }

    fn warning(&self) -> String {
        paint(self, Style::new().yellow())
    }

    fn muted(&self) -> String {
        paint(self, Style::new().dimmed())
    }

    fn header(&self) -> String {
        paint(self, Style::new().bold())
    }

    fn code(&self) -> String {
        paint(self, Style::new().blue())
    }
}
