//! Splitting of fully qualified names into their parent and short parts.
//!
//! Names use `.` or `/` as separators. Separators nested inside a member
//! signature (`(...)`, `<...>` or `[...]`) do not split the name, so
//! `A.B.Run(System.String)` has the parent `A.B`.

/// The name of the root node. It has no parent.
pub const ROOT_NAME: &str = "";

fn is_separator(c: u8) -> bool {
    c == b'.' || c == b'/'
}

/// Split `full_name` into `(parent_name, short_name)` at the last top-level
/// separator. A name without separators is a child of the root.
pub fn parent_name_of(full_name: &str) -> (&str, &str) {
    let bytes = full_name.as_bytes();
    let mut depth = 0i32;
    let mut split_at = None;

    for (index, &c) in bytes.iter().enumerate() {
        match c {
            b'(' | b'<' | b'[' => depth += 1,
            b')' | b'>' | b']' => depth = (depth - 1).max(0),
            c if depth == 0 && is_separator(c) && index > 0 => {
                // `A.B..ctor`: the second dot belongs to the short name.
                if !is_separator(bytes[index - 1]) {
                    split_at = Some(index);
                }
            }
            _ => {}
        }
    }

    match split_at {
        Some(index) => (&full_name[..index], &full_name[index + 1..]),
        None => (ROOT_NAME, full_name),
    }
}

/// All ancestor names of `full_name`, nearest first, ending with the root name.
/// The root itself has no ancestors.
pub fn ancestor_names(full_name: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut current = full_name;
    while current != ROOT_NAME {
        let (parent, _) = parent_name_of(current);
        names.push(parent);
        current = parent;
    }
    names
}
