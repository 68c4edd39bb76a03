use chrono::Local;

/// Produces the `timestamp`/`sign` header pair the DNS/VIP upstream
/// expects on every request: `timestamp` is the current Unix time in
/// seconds, `sign` is the lowercase-hex MD5 digest of
/// `erp || "#" || secret_key || "NP" || time_str`, where `time_str` is
/// the local time formatted as `HHmmyyyyMMdd`.
pub fn sign_request(erp: &str, secret_key: &str) -> (String, String) {
    let now = Local::now();
    let timestamp = now.timestamp().to_string();
    let time_str = now.format("%H%M%Y%m%d").to_string();
    let sign = sign(erp, secret_key, &time_str);
    (timestamp, sign)
}

fn sign(erp: &str, secret_key: &str, time_str: &str) -> String {
    let mut buf = String::with_capacity(erp.len() + secret_key.len() + time_str.len() + 3);
    buf.push_str(erp);
    buf.push('#');
    buf.push_str(secret_key);
    buf.push_str("NP");
    buf.push_str(time_str);
    format!("{:x}", md5::compute(buf.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_matches_known_vector() {
        let got = sign("chenjiao7", "57f8bd5cb103ec39228a6630b3d0e617", "150420060102");
        assert_eq!(got, "942e56423f7f052d46238e97ac7acf54");
    }

    #[test]
    fn sign_is_deterministic_for_same_inputs() {
        let a = sign("erp", "secret", "01022026073031");
        let b = sign("erp", "secret", "01022026073031");
        assert_eq!(a, b);
    }

    #[test]
    fn sign_changes_with_time_str() {
        let a = sign("erp", "secret", "01022026073031");
        let b = sign("erp", "secret", "01032026073031");
        assert_ne!(a, b);
    }
}
