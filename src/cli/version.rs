/// Display version information
pub fn execute() {
    println!("devcred {}", env!("CARGO_PKG_VERSION"));
    println!("Privacy-preserving developer contribution credentials");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_execute() {
        // Version command should not panic
        execute();
    }
}
