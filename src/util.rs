pub fn format_host_port(host: [u8; 4], port: u16) -> String {
    let host_string = host
        .iter()
        .map(|octet| octet.to_string())
        .collect::<Vec<String>>()
        .join(".");
    format!("{}:{}", host_string, port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_host_port() {
        assert_eq!(format_host_port([127, 0, 0, 1], 8443), "127.0.0.1:8443");
    }
}
