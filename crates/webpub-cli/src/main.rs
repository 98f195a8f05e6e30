use std::process;

fn main() {
    match webpub_cli::run() {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("webpub1c: {err}");
            process::exit(webpub_cli::exit_code_for(&err));
        }
    }
}
