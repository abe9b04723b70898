//! Human-friendly rendering of pipeline output.

use chrono::Local;
use wundercast_core::{Presenter, WeatherResult};

/// Prints pipeline effects to the terminal.
#[derive(Debug)]
pub struct TerminalPresenter {
    show_busy: bool,
}

impl TerminalPresenter {
    /// Results and messages only.
    pub fn quiet() -> Self {
        Self { show_busy: false }
    }

    pub fn interactive() -> Self {
        Self { show_busy: true }
    }

    fn line(&self, text: &str) {
        println!("[{}] {text}", Local::now().format("%H:%M:%S"));
    }
}

pub fn format_result(result: &WeatherResult) -> String {
    if result.is_empty() {
        return "No weather data available".to_string();
    }
    format!(
        "{} {}  {}° C  {}% humidity",
        result.icon, result.city_name, result.temperature, result.humidity
    )
}

impl Presenter for TerminalPresenter {
    fn show_result(&mut self, result: &WeatherResult) {
        self.line(&format_result(result));
    }

    fn set_spinner(&mut self, visible: bool) {
        if self.show_busy && visible {
            self.line("Loading...");
        }
    }

    // Labels are redrawn on every result; nothing to hide in line mode.
    fn set_labels_hidden(&mut self, _hidden: bool) {}

    fn show_placeholder(&mut self, label: &str) {
        if self.show_busy {
            self.line(label);
        }
    }

    fn show_message(&mut self, message: &str) {
        eprintln!("[{}] ! {message}", Local::now().format("%H:%M:%S"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_real_result() {
        let result = WeatherResult::new(18, 50, "☀", "London");
        assert_eq!(format_result(&result), "☀ London  18° C  50% humidity");
    }

    #[test]
    fn formats_empty_result() {
        assert_eq!(format_result(&WeatherResult::empty()), "No weather data available");
    }
}
