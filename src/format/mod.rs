use std::time::Duration;

pub fn human_duration(elapsed: Duration) -> String {
    let millis = elapsed.as_millis();

    if millis < 1_000 {
        format!("{}ms", millis)
    } else if millis < 60_000 {
        format!("{:.1}s", elapsed.as_secs_f64())
    } else {
        let secs = elapsed.as_secs();
        format!("{}m {:02}s", secs / 60, secs % 60)
    }
}

/// First line of `text`, cut to at most `max_chars` characters.
pub fn preview(text: &str, max_chars: usize) -> String {
    let line = text.lines().next().unwrap_or("");
    if line.chars().count() <= max_chars && line.len() == text.trim_end().len() {
        return line.to_string();
    }

    let mut cut: String = line.chars().take(max_chars.saturating_sub(1)).collect();
    cut.push('…');
    cut
}
