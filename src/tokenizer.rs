use std::str::Split;

/// Forward-only cursor over the space-separated words of one line.
///
/// Runs of spaces collapse, nothing else is treated specially: quotes and
/// brackets stay attached to whichever word they touch.
#[derive(Debug, Clone)]
pub struct Words<'a> {
    inner: Split<'a, char>,
}

impl<'a> Words<'a> {
    #[inline]
    pub fn new(line: &'a str) -> Words<'a> {
        Words {
            inner: line.split(' '),
        }
    }

    /// Next word, or `""` once the line is exhausted.
    #[inline]
    pub fn next_or_empty(&mut self) -> &'a str {
        self.next().unwrap_or("")
    }
}

impl<'a> Iterator for Words<'a> {
    type Item = &'a str;

    #[inline]
    fn next(&mut self) -> Option<&'a str> {
        self.inner.by_ref().find(|w| !w.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_line() {
        let mut words = Words::new("");
        assert_eq!(words.next(), None);
        assert_eq!(words.next_or_empty(), "");
    }

    #[test]
    fn test_sequential() {
        let mut words = Words::new("Hello world!");
        assert_eq!(words.next_or_empty(), "Hello");
        assert_eq!(words.next_or_empty(), "world!");
        assert_eq!(words.next_or_empty(), "");
        assert_eq!(words.next_or_empty(), "");
    }

    #[test]
    fn test_collapses_runs_of_spaces() {
        let words: Vec<_> = Words::new("  a   b c  ").collect();
        assert_eq!(words, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_only_spaces() {
        assert_eq!(Words::new("     ").count(), 0);
    }

    #[test]
    fn test_quotes_stay_attached() {
        let words: Vec<_> = Words::new(r#""GET /index.html HTTP/1.1" [25/Dec/2023:10:30:45 +0000]"#)
            .collect();
        assert_eq!(
            words,
            vec![
                "\"GET",
                "/index.html",
                "HTTP/1.1\"",
                "[25/Dec/2023:10:30:45",
                "+0000]"
            ]
        );
    }

    #[test]
    fn test_tab_is_not_a_separator() {
        let words: Vec<_> = Words::new("a\tb c").collect();
        assert_eq!(words, vec!["a\tb", "c"]);
    }
}
