/// Previously visited page URLs, used to compute the back link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationProgress {
    entries: Vec<String>,
}

impl NavigationProgress {
    pub fn new(entries: Vec<String>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<String> {
        self.entries
    }

    /// Record a visit to `url`.
    ///
    /// Revisiting the current page changes nothing. Revisiting the page
    /// before it is a step back and pops the current page.
    pub fn visit(&mut self, url: &str) {
        let len = self.entries.len();
        if self.entries.last().is_some_and(|last| last == url) {
            return;
        }
        if len >= 2 && self.entries[len - 2] == url {
            self.entries.pop();
        } else {
            self.entries.push(url.to_string());
        }
    }

    /// The second-to-last entry.
    pub fn back_link(&self) -> Option<&str> {
        let len = self.entries.len();
        if len < 2 {
            return None;
        }
        self.entries.get(len - 2).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk(urls: &[&str]) -> NavigationProgress {
        let mut progress = NavigationProgress::default();
        for url in urls {
            progress.visit(url);
        }
        progress
    }

    #[test]
    fn back_then_forward_does_not_grow() {
        let progress = walk(&["/f/p1", "/f/p2", "/f/p1", "/f/p2"]);
        assert_eq!(progress.entries(), &["/f/p1".to_string(), "/f/p2".to_string()]);
        assert_eq!(progress.back_link(), Some("/f/p1"));
    }

    #[test]
    fn reload_is_a_no_op() {
        let progress = walk(&["/f/p1", "/f/p1"]);
        assert_eq!(progress.entries().len(), 1);
        assert_eq!(progress.back_link(), None);
    }

    #[test]
    fn only_the_immediate_predecessor_is_collapsed() {
        let progress = walk(&["/f/a", "/f/b", "/f/c", "/f/a"]);
        assert_eq!(progress.entries().len(), 4);
        assert_eq!(progress.back_link(), Some("/f/c"));
    }

    #[test]
    fn query_strings_distinguish_iterations() {
        let progress = walk(&["/f/name?num=1", "/f/age?num=1", "/f/name?num=2"]);
        assert_eq!(progress.entries().len(), 3);
    }
}
