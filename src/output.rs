//! User-facing console text that is not tied to a single download.

const NO_INPUT_GUIDANCE: &str = "No track list provided. Pass a JSON file or pipe one via stdin.";
const EMPTY_STDIN_GUIDANCE: &str = "Stdin was empty. Pipe a JSON track list or pass a file path.";
const INPUT_PIPE_EXAMPLE: &str = "  Example: cat album.json | songdl --format mp3";
const INPUT_ARG_EXAMPLE: &str = "  Example: songdl playlist.json -o music -c 4 --metadata";

pub(crate) fn quick_start_guidance_lines(empty_stdin: bool) -> [&'static str; 3] {
    let headline = if empty_stdin {
        EMPTY_STDIN_GUIDANCE
    } else {
        NO_INPUT_GUIDANCE
    };
    [headline, INPUT_PIPE_EXAMPLE, INPUT_ARG_EXAMPLE]
}

/// Prints quick-start guidance to stdout (no input or empty stdin).
pub(crate) fn print_quick_start_guidance(empty_stdin: bool) {
    for line in quick_start_guidance_lines(empty_stdin) {
        println!("{line}");
    }
}
