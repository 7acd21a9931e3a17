use uuid::Uuid;

const SUFFIX_LEN: usize = 6;

/// URL-safe slug for a new session: the ASCII-folded title plus a random
/// six character suffix.
pub fn session_slug(title: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", slug_base(title), &suffix[..SUFFIX_LEN])
}

pub fn slug_base(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;

    for ch in title.chars().flat_map(char::to_lowercase) {
        let folded = if ch.is_ascii_alphanumeric() {
            None
        } else {
            match fold(ch) {
                Some(folded) => Some(folded),
                None => {
                    pending_dash = !slug.is_empty();
                    continue;
                }
            }
        };

        if pending_dash {
            slug.push('-');
            pending_dash = false;
        }
        match folded {
            Some(folded) => slug.push_str(folded),
            None => slug.push(ch),
        }
    }

    if slug.is_empty() {
        slug.push_str("session");
    }
    slug
}

fn fold(ch: char) -> Option<&'static str> {
    let folded = match ch {
        'æ' => "ae",
        'ø' => "o",
        'å' => "aa",
        'à' | 'á' | 'â' | 'ã' | 'ä' => "a",
        'ç' => "c",
        'è' | 'é' | 'ê' | 'ë' => "e",
        'ì' | 'í' | 'î' | 'ï' => "i",
        'ñ' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => "o",
        'ù' | 'ú' | 'û' | 'ü' => "u",
        'ý' | 'ÿ' => "y",
        'ß' => "ss",
        _ => return None,
    };
    Some(folded)
}
