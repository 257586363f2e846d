//! Navigation: tree state machine and listing order.

pub mod tree;

pub use tree::{LoadState, NavMessage, NavigationEngine, NodeId};

use crate::model::Resource;

/// Sorts resources by name, case-insensitive. When `dirs_first` is set,
/// directories always come before files regardless of name.
pub fn sort_resources(resources: &mut [Resource], dirs_first: bool) {
    resources.sort_by(|a, b| {
        if dirs_first {
            let dir_cmp = b.is_directory().cmp(&a.is_directory());
            if dir_cmp != std::cmp::Ordering::Equal {
                return dir_cmp;
            }
        }
        a.name().to_lowercase().cmp(&b.name().to_lowercase())
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HostId;

    fn res(name: &str, directory: bool) -> Resource {
        Resource::new(
            format!("/{name}"),
            name,
            "application/octet-stream",
            0,
            None,
            None,
            directory,
            HostId::new("test"),
        )
    }

    #[test]
    fn sorts_by_name_case_insensitive() {
        let mut list = vec![res("banana", false), res("Apple", false), res("cherry", false)];
        sort_resources(&mut list, false);
        let names: Vec<&str> = list.iter().map(Resource::name).collect();
        assert_eq!(names, vec!["Apple", "banana", "cherry"]);
    }

    #[test]
    fn dirs_first_overrides_name_order() {
        let mut list = vec![
            res("banana.txt", false),
            res("apple.txt", false),
            res("zeta", true),
            res("alpha", true),
        ];
        sort_resources(&mut list, true);
        let names: Vec<&str> = list.iter().map(Resource::name).collect();
        assert_eq!(names, vec!["alpha", "zeta", "apple.txt", "banana.txt"]);
    }

    #[test]
    fn dirs_not_prioritized_when_disabled() {
        let mut list = vec![res("zeta", true), res("apple.txt", false)];
        sort_resources(&mut list, false);
        assert_eq!(list[0].name(), "apple.txt");
    }
}
