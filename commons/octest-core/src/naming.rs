// DNS-1123 safe characters for generated names
pub const ALPHABET: [char; 36] = [
    'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o',
    'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', '0', '1', '2', '3',
    '4', '5', '6', '7', '8', '9',
];

pub fn random_suffix(len: usize) -> String {
    nanoid::nanoid!(len, &ALPHABET)
}

/// `<prefix>-<8 random chars>`, unique enough to keep concurrent scenarios
/// from stepping on each other's objects.
pub fn uniq(prefix: &str) -> String {
    format!("{prefix}-{}", random_suffix(8))
}
