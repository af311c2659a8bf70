use console::{Emoji, style};

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_info(msg: &str) {
    println!("{} {}", INFO_ICON, style(msg).blue());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

/// Titled block of aligned rows for help and status screens.
pub struct GuideSection {
    title: String,
    rows: Vec<Option<(String, String)>>,
}

impl GuideSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            rows: Vec::new(),
        }
    }

    pub fn command(mut self, name: &str, about: &str) -> Self {
        self.rows.push(Some((name.to_string(), about.to_string())));
        self
    }

    pub fn status(self, label: &str, value: &str) -> Self {
        self.command(label, value)
    }

    pub fn blank(mut self) -> Self {
        self.rows.push(None);
        self
    }

    pub fn print(&self) {
        let width = self
            .rows
            .iter()
            .flatten()
            .map(|(name, _)| name.chars().count())
            .max()
            .unwrap_or(0);
        println!("\n {}", style(&self.title).bold().underlined());
        for row in &self.rows {
            match row {
                Some((name, about)) => println!(
                    "   {}  {}",
                    style(format!("{:<width$}", name)).green(),
                    about
                ),
                None => println!(),
            }
        }
    }
}

pub fn print_banner() {
    let lines: &[&str] = &[
        r"                     _           _    ",
        r"  ___  _ __  ___  __| | ___  ___| | __",
        r" / _ \| '_ \/ __|/ _` |/ _ \/ __| |/ /",
        r"| (_) | |_) \__ \ (_| |  __/ (__|   < ",
        r" \___/| .__/|___/\__,_|\___|\___|_|\_\",
        r"      |_|                             ",
    ];

    // Gradient: #34d399 → #22d3ee → #818cf8 (diagonal top-left → bottom-right)
    let stops: [(u8, u8, u8); 3] = [(52, 211, 153), (34, 211, 238), (129, 140, 248)];
    let max_w = 38u32;
    let max_d = max_w + 5 * 10;

    println!();
    for (y, line) in lines.iter().enumerate() {
        for (x, ch) in line.chars().enumerate() {
            if ch == ' ' {
                print!(" ");
                continue;
            }
            let d = ((x as u32 + y as u32 * 10) * 1000 / max_d).min(1000);
            let (r, g, b) = if d <= 500 {
                lerp_color(stops[0], stops[1], d * 2)
            } else {
                lerp_color(stops[1], stops[2], (d - 500) * 2)
            };
            print!("\x1b[38;2;{};{};{}m{}", r, g, b, ch);
        }
        println!();
    }
    print!("\x1b[0m");

    println!("\x1b[38;2;34;211;238mEyes on the fleet while it works.\x1b[0m\n");
}

fn lerp_color(a: (u8, u8, u8), b: (u8, u8, u8), t: u32) -> (u8, u8, u8) {
    let r = (a.0 as u32 * (1000 - t) + b.0 as u32 * t) / 1000;
    let g = (a.1 as u32 * (1000 - t) + b.1 as u32 * t) / 1000;
    let b_val = (a.2 as u32 * (1000 - t) + b.2 as u32 * t) / 1000;
    (r as u8, g as u8, b_val as u8)
}

pub fn print_goodbye() {
    println!("\n{} {}", SPARKLE, style("opsdeck stopped.").bold().cyan());
}
