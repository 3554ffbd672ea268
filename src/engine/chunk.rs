/// Split `text` into consecutive slices of at most `budget` bytes.
///
/// Cuts prefer the last newline inside the window, then the last whitespace, then the
/// last char boundary. Concatenating the slices gives back `text`. A single character
/// wider than `budget` still becomes its own slice.
pub fn split(text: &str, budget: usize) -> Vec<&str> {
    let budget = budget.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.len() > budget {
        let mut end = budget;
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            end = rest.chars().next().map(char::len_utf8).unwrap_or(rest.len());
        }

        let window = &rest[..end];
        let cut = window
            .rfind('\n')
            .map(|i| i + 1)
            .or_else(|| {
                window
                    .char_indices()
                    .rev()
                    .find(|(_, c)| c.is_whitespace())
                    .map(|(i, c)| i + c.len_utf8())
            })
            .filter(|&i| i > 0)
            .unwrap_or(end);

        chunks.push(&rest[..cut]);
        rest = &rest[cut..];
    }

    if !rest.is_empty() {
        chunks.push(rest);
    }

    chunks
}
