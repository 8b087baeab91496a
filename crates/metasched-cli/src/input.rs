use std::io::BufRead;

/// Reads one command per line from standard input, stripping surrounding
/// whitespace and discarding blank lines. Order is preserved.
pub fn read_commands(reader: impl BufRead) -> anyhow::Result<Vec<String>> {
    let mut commands = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            commands.push(trimmed.to_string());
        }
    }
    Ok(commands)
}
