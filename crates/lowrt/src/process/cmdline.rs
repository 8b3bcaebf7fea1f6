//! Windows command-line and environment-block encoding.
//!
//! Windows hands a child one flat command line; the child's C runtime splits
//! it back into arguments. [`quote_arg`] and [`split_command_line`] are the
//! two halves of that convention, so any argument list survives the trip.
//! Plain byte code, compiled everywhere so it can be tested on any host.

use crate::os::env::Vars;

fn is_blank(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

/// Quote one argument for the child's runtime parser.
///
/// Backslashes are literal unless they precede a quote: a run of `n` before
/// an embedded quote becomes `2n + 1`, a run of `n` before the closing quote
/// becomes `2n`.
pub fn quote_arg(arg: &[u8], out: &mut Vec<u8>) {
    let needs_quotes =
        arg.is_empty() || arg.iter().any(|&b| is_blank(b) || b == b'\n' || b == b'"');
    if !needs_quotes {
        out.extend_from_slice(arg);
        return;
    }
    out.push(b'"');
    let mut backslashes = 0usize;
    for &b in arg {
        match b {
            b'\\' => backslashes += 1,
            b'"' => {
                out.extend(std::iter::repeat(b'\\').take(2 * backslashes + 1));
                out.push(b'"');
                backslashes = 0;
            }
            _ => {
                out.extend(std::iter::repeat(b'\\').take(backslashes));
                out.push(b);
                backslashes = 0;
            }
        }
    }
    out.extend(std::iter::repeat(b'\\').take(2 * backslashes));
    out.push(b'"');
}

/// Flat command line for `program` and `args`, without a terminator.
///
/// The program name follows the simpler argv[0] rule (quotes delimit,
/// backslashes are literal), so it is only wrapped, never escaped.
pub fn build_command_line(program: &[u8], args: &[Vec<u8>]) -> Vec<u8> {
    let hint = args.iter().map(|a| a.len() + 3).sum::<usize>();
    let mut out = Vec::with_capacity(program.len() + 2 + hint);
    if program.is_empty() || program.iter().any(|&b| is_blank(b)) {
        out.push(b'"');
        out.extend_from_slice(program);
        out.push(b'"');
    } else {
        out.extend_from_slice(program);
    }
    for arg in args {
        out.push(b' ');
        quote_arg(arg, &mut out);
    }
    out
}

/// Split a flat command line the way the C runtime does.
pub fn split_command_line(line: &[u8]) -> Vec<Vec<u8>> {
    let mut args = Vec::new();
    let mut i = 0usize;

    // argv[0]: quotes delimit, nothing is escaped.
    let mut first = Vec::new();
    if line.first() == Some(&b'"') {
        i = 1;
        while i < line.len() && line[i] != b'"' {
            first.push(line[i]);
            i += 1;
        }
        i += 1;
    } else {
        while i < line.len() && !is_blank(line[i]) {
            first.push(line[i]);
            i += 1;
        }
    }
    if line.is_empty() {
        return args;
    }
    args.push(first);

    loop {
        while i < line.len() && is_blank(line[i]) {
            i += 1;
        }
        if i >= line.len() {
            return args;
        }
        let mut arg = Vec::new();
        let mut quoted = false;
        while i < line.len() {
            let b = line[i];
            if b == b'\\' {
                let run = line[i..].iter().take_while(|&&c| c == b'\\').count();
                i += run;
                if line.get(i) == Some(&b'"') {
                    arg.extend(std::iter::repeat(b'\\').take(run / 2));
                    if run % 2 == 1 {
                        arg.push(b'"');
                        i += 1;
                    }
                } else {
                    arg.extend(std::iter::repeat(b'\\').take(run));
                }
            } else if b == b'"' {
                if quoted && line.get(i + 1) == Some(&b'"') {
                    arg.push(b'"');
                    i += 2;
                } else {
                    quoted = !quoted;
                    i += 1;
                }
            } else if is_blank(b) && !quoted {
                break;
            } else {
                arg.push(b);
                i += 1;
            }
        }
        args.push(arg);
    }
}

/// Double-NUL environment block: `K=V\0` per variable, then one more `\0`.
pub fn env_block(vars: &Vars) -> Vec<u8> {
    let mut out = Vec::new();
    for (k, v) in vars {
        out.extend_from_slice(k);
        out.push(b'=');
        out.extend_from_slice(v);
        out.push(0);
    }
    if vars.is_empty() {
        out.push(0);
    }
    out.push(0);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quoted(arg: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        quote_arg(arg, &mut out);
        out
    }

    #[test]
    fn plain_arguments_pass_through() {
        assert_eq!(quoted(b"simple"), b"simple");
        assert_eq!(quoted(br"C:\dir\file"), br"C:\dir\file");
    }

    #[test]
    fn backslashes_double_only_before_quotes() {
        assert_eq!(quoted(b""), b"\"\"");
        assert_eq!(quoted(b"a b"), b"\"a b\"");
        assert_eq!(quoted(br#"say "hi""#), br#""say \"hi\"""#);
        assert_eq!(quoted(br"dir\ x\"), br#""dir\ x\\""#);
        assert_eq!(quoted(br#"a\"b"#), br#""a\\\"b""#);
    }

    #[test]
    fn split_follows_runtime_rules() {
        let line = br#""C:\Program Files\app.exe" a\\b "c d" e\"f g\\"h i" """#;
        let args = split_command_line(line);
        assert_eq!(
            args,
            vec![
                br"C:\Program Files\app.exe".to_vec(),
                br"a\\b".to_vec(),
                b"c d".to_vec(),
                br#"e"f"#.to_vec(),
                br"g\h i".to_vec(),
                b"".to_vec(),
            ]
        );
    }

    #[test]
    fn doubled_quote_inside_quotes_is_literal() {
        let args = split_command_line(br#"prog "a""b" c"#);
        assert_eq!(args, vec![b"prog".to_vec(), br#"a"b"#.to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn unquoted_argv0_keeps_backslashes() {
        assert_eq!(split_command_line(br"C:\bin\x.exe"), vec![br"C:\bin\x.exe".to_vec()]);
        assert!(split_command_line(b"").is_empty());
    }

    #[test]
    fn built_command_line_splits_back_to_the_same_arguments() {
        let args: Vec<Vec<u8>> = vec![
            b"".to_vec(),
            b"two words".to_vec(),
            br#"quote " inside"#.to_vec(),
            br"trailing\".to_vec(),
            br"spaced trailing \\".to_vec(),
            br#"\\"\"#.to_vec(),
        ];
        let line = build_command_line(br"C:\Program Files\tool.exe", &args);
        let back = split_command_line(&line);
        assert_eq!(back[0], br"C:\Program Files\tool.exe");
        assert_eq!(&back[1..], &args[..]);
    }

    #[test]
    fn environment_block_is_double_nul_terminated() {
        let vars = vec![
            (b"A".to_vec(), b"1".to_vec()),
            (b"=C:".to_vec(), br"C:\w".to_vec()),
        ];
        assert_eq!(env_block(&vars), b"A=1\0=C:=C:\\w\0\0");
        assert_eq!(env_block(&Vec::new()), b"\0\0");
    }
}
