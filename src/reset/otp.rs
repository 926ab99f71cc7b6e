use rand::Rng;

pub const CODE_LEN: usize = 6;

/// Six decimal digits, never starting with zero.
pub fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..1_000_000).to_string()
}

pub fn looks_like_code(candidate: &str) -> bool {
    candidate.chars().count() == CODE_LEN
}
