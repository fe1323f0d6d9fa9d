const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Human readable byte count, e.g. `1.50 MB`.
pub fn format_size(size: u64, precision: u8) -> String {
    let mut size_float = size as f64;
    let mut unit = 0;

    while size_float >= 1024.0 && unit < UNITS.len() - 1 {
        size_float /= 1024.0;
        unit += 1;
    }

    format!(
        "{number:.prec$} {unit}",
        number = size_float,
        prec = precision as usize,
        unit = UNITS[unit]
    )
}
