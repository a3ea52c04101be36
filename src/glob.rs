/// Match a key against a pattern where `*` is any run of bytes and `?` is
/// any single byte. Everything else matches literally.
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let (p, s) = (pattern.as_bytes(), key.as_bytes());
    let (mut pi, mut si) = (0, 0);
    // position after the last `*` seen, and where in `s` it started matching
    let mut backtrack: Option<(usize, usize)> = None;

    while si < s.len() {
        match p.get(pi) {
            Some(b'*') => {
                pi += 1;
                backtrack = Some((pi, si));
            }
            Some(&c) if c == b'?' || c == s[si] => {
                pi += 1;
                si += 1;
            }
            _ => match backtrack {
                Some((star_pi, star_si)) => {
                    pi = star_pi;
                    si = star_si + 1;
                    backtrack = Some((star_pi, si));
                }
                None => return false,
            },
        }
    }

    p[pi..].iter().all(|&c| c == b'*')
}
