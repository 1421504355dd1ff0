//! SVG flamegraph and terminal hot-path rendering.
//!
//! SVG output is produced by inferno from collapsed stacks. The terminal
//! summary is a boxed table of the heaviest paths plus a bar chart.

use crate::aggregator::stack_builder::CollapsedStack;
use crate::stats::Mode;
use crate::utils::error::FlamegraphError;
use inferno::flamegraph::{self, Options};
use log::info;

/// Flamegraph configuration
#[derive(Debug, Clone)]
pub struct FlamegraphConfig {
    pub title: String,
    pub width: usize,
    /// Unit shown in frame tooltips
    pub count_name: String,
}

impl Default for FlamegraphConfig {
    fn default() -> Self {
        Self {
            title: "Call Profile".to_string(),
            width: 1200,
            count_name: "ns".to_string(),
        }
    }
}

impl FlamegraphConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults matching the unit of `mode`
    pub fn for_mode(mode: Mode) -> Self {
        Self::default().with_count_name(mode.unit())
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    pub fn with_count_name(mut self, count_name: impl Into<String>) -> Self {
        self.count_name = count_name.into();
        self
    }
}

/// Generate SVG flamegraph from collapsed stacks
///
/// **Public** - main entry point for flamegraph rendering
pub fn generate_flamegraph(
    stacks: &[CollapsedStack],
    config: Option<&FlamegraphConfig>,
) -> Result<String, FlamegraphError> {
    let lines: Vec<String> = stacks
        .iter()
        .filter(|stack| stack.weight > 0)
        .map(CollapsedStack::to_line)
        .collect();
    if lines.is_empty() {
        return Err(FlamegraphError::EmptyStacks);
    }

    let config = config.cloned().unwrap_or_default();
    info!("Generating flamegraph with {} stacks", lines.len());

    let mut options = Options::default();
    options.title = config.title.clone();
    options.count_name = config.count_name.clone();
    options.image_width = Some(config.width);

    let mut svg = Vec::new();
    flamegraph::from_lines(&mut options, lines.iter().map(String::as_str), &mut svg)
        .map_err(|e| FlamegraphError::Render(e.to_string()))?;
    let svg = String::from_utf8(svg)?;

    info!("Flamegraph generated successfully ({} bytes)", svg.len());
    Ok(svg)
}

fn get_ansi_color(percentage: f64) -> &'static str {
    if percentage >= 25.0 {
        "\x1b[31;1m" // Red
    } else if percentage >= 10.0 {
        "\x1b[33m" // Yellow
    } else if percentage >= 2.0 {
        "\x1b[32m" // Green
    } else {
        "\x1b[90m" // Gray
    }
}

/// Create a rich text summary with percentages and table formatting
///
/// **Public** - printed by `profile --summary` and `flamegraph --summary`
pub fn generate_text_summary(stacks: &[CollapsedStack], max_lines: usize, mode: Mode) -> String {
    let reset = "\x1b[0m";
    let total = stacks.iter().map(|s| s.weight).sum::<u64>().max(1);
    let mut lines = Vec::new();

    lines.push("  HOT PATHS".to_string());
    lines.push(format!("  ┏{}┳{}┳{}┓", "━".repeat(44), "━".repeat(14), "━".repeat(9)));
    lines.push(format!(
        "  ┃ {:<42} ┃ {:^12} ┃ {:^7} ┃",
        "Call Stack (Hottest First)",
        mode.unit().to_uppercase(),
        "%"
    ));
    lines.push(format!("  ┣{}╋{}╋{}┫", "━".repeat(44), "━".repeat(14), "━".repeat(9)));

    for stack in stacks.iter().take(max_lines) {
        let percentage = (stack.weight as f64 / total as f64) * 100.0;
        let color = get_ansi_color(percentage);

        let display_stack = if stack.stack.chars().count() > 42 {
            let tail: String = {
                let chars: Vec<char> = stack.stack.chars().collect();
                chars[chars.len() - 39..].iter().collect()
            };
            format!("...{}", tail)
        } else {
            stack.stack.clone()
        };

        lines.push(format!(
            "  ┃ {}{:<42}{} ┃ {:>12} ┃ {:>6.1}% ┃",
            color, display_stack, reset, stack.weight, percentage
        ));
    }
    lines.push(format!("  ┗{}┻{}┻{}┛", "━".repeat(44), "━".repeat(14), "━".repeat(9)));

    lines.push(String::new());
    lines.push("  SIMPLIFIED FLAMEGRAPH".to_string());
    for stack in stacks.iter().take(5) {
        let percentage = (stack.weight as f64 / total as f64) * 100.0;
        let bar = "█".repeat((percentage / 2.0) as usize);
        let color = get_ansi_color(percentage);
        lines.push(format!(
            "  └─ {}{:<24}{} {}{:50}{} {:>5.1}%",
            color,
            stack.leaf(),
            reset,
            color,
            bar,
            reset,
            percentage
        ));
    }

    if stacks.len() > max_lines {
        lines.push(String::new());
        lines.push(format!(
            "   (Showing top {} of {} unique paths)",
            max_lines,
            stacks.len()
        ));
    }

    lines.join("\n")
}
