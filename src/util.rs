//! Small helpers for image names and ordered lists

/// Strip the last extension from a file name (`scanned.jpg` -> `scanned`)
pub fn filename_without_extension(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(pos) => &filename[..pos],
        None => filename,
    }
}

/// Category prefix of an image name (`A/1.jpg` -> `A`)
pub fn category_of(image_name: &str) -> Option<&str> {
    image_name.find('/').map(|pos| &image_name[..pos])
}

/// Move the item at `index` one position towards the front.
///
/// Out-of-range indexes (and the first item) leave the list unchanged.
pub fn move_item_up<T>(items: &mut [T], index: usize) -> bool {
    if index == 0 || index >= items.len() {
        return false;
    }
    items.swap(index - 1, index);
    true
}

/// Move the item at `index` one position towards the back.
///
/// Out-of-range indexes (and the last item) leave the list unchanged.
pub fn move_item_down<T>(items: &mut [T], index: usize) -> bool {
    if index + 1 >= items.len() {
        return false;
    }
    items.swap(index, index + 1);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_without_extension() {
        assert_eq!(filename_without_extension("scanned.jpg"), "scanned");
        assert_eq!(filename_without_extension("scanned"), "scanned");
        assert_eq!(filename_without_extension("archive.tar.gz"), "archive.tar");
        assert_eq!(filename_without_extension("A/1.jpg"), "A/1");
    }

    #[test]
    fn test_category_of() {
        assert_eq!(category_of("A/1.jpg"), Some("A"));
        assert_eq!(category_of("passport/td3.png"), Some("passport"));
        assert_eq!(category_of("1.jpg"), None);
    }

    #[test]
    fn test_move_item_up() {
        let mut items = vec!["a", "b", "c"];
        assert!(move_item_up(&mut items, 2));
        assert_eq!(items, vec!["a", "c", "b"]);

        // First item and out-of-range indexes are no-ops
        assert!(!move_item_up(&mut items, 0));
        assert!(!move_item_up(&mut items, 3));
        assert_eq!(items, vec!["a", "c", "b"]);
    }

    #[test]
    fn test_move_item_down() {
        let mut items = vec!["a", "b", "c"];
        assert!(move_item_down(&mut items, 0));
        assert_eq!(items, vec!["b", "a", "c"]);

        assert!(!move_item_down(&mut items, 2));
        assert!(!move_item_down(&mut items, 7));
        assert_eq!(items, vec!["b", "a", "c"]);
    }
}
