/// Extracts the `page_info` cursor of the `rel="next"` entry from a `Link`
/// response header. The cursor is returned URL-decoded.
pub fn next_page_info(link_header: &str) -> Option<String> {
    link_header
        .split(',')
        .filter(|entry| entry.contains("rel=\"next\""))
        .find_map(|entry| {
            let start = entry.find('<')? + 1;
            let end = entry[start..].find('>')? + start;
            let url = &entry[start..end];
            let cursor_start = url.find("page_info=")? + "page_info=".len();
            let raw = url[cursor_start..].split('&').next()?;
            if raw.is_empty() {
                return None;
            }
            urlencoding::decode(raw).ok().map(|cursor| cursor.into_owned())
        })
}
