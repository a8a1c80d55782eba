/// Fit text lines onto a `cols` x `rows` character grid.
///
/// Lines beyond `rows` are dropped, characters beyond `cols` are clipped and
/// short lines are padded with spaces so every frame fully overwrites the
/// previous one.
pub fn fit_to_grid(lines: &[String], cols: usize, rows: usize) -> Vec<String> {
    let mut out = Vec::with_capacity(rows);
    for line in lines.iter().take(rows) {
        let mut clipped: String = line.chars().take(cols).collect();
        let len = clipped.chars().count();
        clipped.extend(std::iter::repeat_n(' ', cols - len));
        out.push(clipped);
    }
    while out.len() < rows {
        out.push(" ".repeat(cols));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::fit_to_grid;

    #[test]
    fn clips_and_pads() {
        let lines = vec!["Refill-Sustentavel".to_string(), "ok".to_string()];
        let grid = fit_to_grid(&lines, 8, 3);
        assert_eq!(grid, vec!["Refill-S", "ok      ", "        "]);
    }

    #[test]
    fn drops_extra_rows() {
        let lines: Vec<String> = (0..5).map(|i| i.to_string()).collect();
        assert_eq!(fit_to_grid(&lines, 1, 2), vec!["0", "1"]);
    }

    #[test]
    fn counts_chars_not_bytes() {
        let lines = vec!["Concluído!".to_string()];
        assert_eq!(fit_to_grid(&lines, 9, 1), vec!["Concluído"]);
    }
}
