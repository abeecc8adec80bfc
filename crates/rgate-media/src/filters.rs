//! FFmpeg filter expressions for plan elements.

use rgate_models::{TextOverlay, TextPosition, VideoFilter};

/// Format milliseconds as seconds with millisecond precision ("5.000").
pub fn secs(ms: i64) -> String {
    let sign = if ms < 0 { "-" } else { "" };
    let ms = ms.abs();
    format!("{}{}.{:03}", sign, ms / 1000, ms % 1000)
}

/// Format a factor compactly and deterministically ("2", "0.5", "1.333333").
pub fn number(value: f64) -> String {
    let s = format!("{:.6}", value);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() || s == "-" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// Build filter for a per-segment visual effect.
pub fn video_filter(filter: &VideoFilter) -> String {
    match filter {
        VideoFilter::Grayscale => "hue=s=0".to_string(),
        VideoFilter::Blur { sigma } => format!("gblur=sigma={}", number(*sigma)),
        VideoFilter::Sharpen => "unsharp=5:5:1.0:5:5:0.0".to_string(),
        VideoFilter::Brightness { value } => format!("eq=brightness={}", number(*value)),
        VideoFilter::Contrast { value } => format!("eq=contrast={}", number(*value)),
        VideoFilter::Saturation { value } => format!("eq=saturation={}", number(*value)),
    }
}

/// Scale into `width`x`height` preserving aspect ratio, pad the rest, square pixels.
pub fn fit_frame(width: u32, height: u32) -> String {
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1",
        w = width,
        h = height
    )
}

/// Split a tempo factor into `atempo` stages, each within [0.5, 2].
pub fn atempo_chain(speed: f64) -> Vec<String> {
    let mut stages = Vec::new();
    if !(speed.is_finite() && speed > 0.0) || (speed - 1.0).abs() <= f64::EPSILON {
        return stages;
    }

    let mut remaining = speed;
    while remaining > 2.0 {
        stages.push("atempo=2".to_string());
        remaining /= 2.0;
    }
    while remaining < 0.5 {
        stages.push("atempo=0.5".to_string());
        remaining /= 0.5;
    }
    if (remaining - 1.0).abs() > 1e-9 {
        stages.push(format!("atempo={}", number(remaining)));
    }
    stages
}

/// Enable predicate visible on `[start, end)`.
pub fn enable_window(start_ms: i64, end_ms: i64) -> String {
    format!("enable='gte(t,{})*lt(t,{})'", secs(start_ms), secs(end_ms))
}

/// Escape text for use inside a quoted drawtext `text` option.
pub fn escape_drawtext(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            // A straight quote would end the quoted value
            '\'' => out.push('\u{2019}'),
            ':' => out.push_str("\\:"),
            '\n' | '\r' => out.push(' '),
            c => out.push(c),
        }
    }
    out
}

fn quote_expr(expr: &str) -> String {
    format!("'{}'", expr.replace('\'', ""))
}

/// Build a drawtext node body for an overlay, gated to its own window.
pub fn drawtext(overlay: &TextOverlay) -> String {
    let x = overlay.x.as_deref().unwrap_or("(w-text_w)/2");
    let y = match (&overlay.y, overlay.position) {
        (Some(y), _) => y.as_str(),
        (None, TextPosition::Top) => "h*0.08",
        (None, TextPosition::Center) => "(h-text_h)/2",
        (None, TextPosition::Bottom) => "h-text_h-h*0.08",
    };

    let mut parts = vec![format!("drawtext=text='{}'", escape_drawtext(&overlay.content))];
    parts.push("expansion=none".to_string());
    if let Some(font) = &overlay.font_file {
        parts.push(format!("fontfile={}", quote_expr(font)));
    }
    parts.push(format!("fontsize={}", overlay.font_size));
    parts.push(format!("fontcolor={}", quote_expr(&overlay.font_color)));
    parts.push(format!("x={}", quote_expr(x)));
    parts.push(format!("y={}", quote_expr(y)));
    if let Some(bg) = &overlay.background {
        parts.push("box=1".to_string());
        parts.push(format!("boxcolor={}", quote_expr(&format!("{}@{}", bg.color, number(bg.opacity)))));
        parts.push(format!("boxborderw={}", bg.padding));
    }
    parts.push(enable_window(overlay.timeline_start_ms, overlay.timeline_end_ms));

    parts.join(":")
}
