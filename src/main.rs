use std::env;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::process;

use hollicode::bytecode::{disasm, loader};
use hollicode::{BytecodeFormat, Interpreter};

fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--help".to_string()) || args.contains(&"-h".to_string()) {
        print_usage();
        return;
    }

    let disasm_only = args.contains(&"--disasm".to_string());
    let format = if args.contains(&"--text".to_string()) {
        Some(BytecodeFormat::Text)
    } else if args.contains(&"--structured".to_string()) {
        Some(BytecodeFormat::Structured)
    } else {
        None
    };

    // first non-flag argument is the filename
    let filename = args.iter().skip(1).find(|a| !a.starts_with('-'));

    match filename {
        Some(filename) => {
            if disasm_only {
                print_disassembly(Path::new(filename), format);
            } else {
                run_script(Path::new(filename), format);
            }
        }
        None => {
            print_usage();
            process::exit(1);
        }
    }
}

fn print_usage() {
    println!("HOLLICODE - Narrative script interpreter");
    println!();
    println!("Usage:");
    println!("  hollicode <file.hlct|file.hlcj>   Run a compiled script");
    println!("  hollicode --disasm <file>         Print disassembly only");
    println!("  hollicode --text <file>           Force the text bytecode loader");
    println!("  hollicode --structured <file>     Force the structured bytecode loader");
    println!("  hollicode --help, -h              Show this help");
}

fn print_disassembly(path: &Path, format: Option<BytecodeFormat>) {
    match loader::load_path(path, format, false) {
        Ok(program) => disasm::print_program(&program),
        Err(e) => {
            eprintln!("Failed to load '{}': {}", path.display(), e);
            process::exit(1);
        }
    }
}

fn run_script(path: &Path, format: Option<BytecodeFormat>) {
    let mut vm = Interpreter::new();

    let loaded = match format {
        Some(format) => vm.load_file_as(path, format),
        None => vm.load_file(path),
    };
    if let Err(e) = loaded {
        eprintln!("Failed to load '{}': {}", path.display(), e);
        process::exit(1);
    }

    vm.callbacks.echo = Some(Box::new(|_, value| println!("{}", value)));

    loop {
        if let Err(e) = vm.run() {
            eprintln!("Runtime error at instruction {}: {}", vm.ip(), e);
            process::exit(1);
        }

        if vm.finished() {
            break;
        }

        // Suspended at a WAIT. Prompt for a choice if any options are
        // pending; otherwise it is a pacing pause, resumed on enter.
        if vm.pending_options().is_empty() {
            if !wait_for_enter() {
                break;
            }
            continue;
        }

        println!();
        for (i, option) in vm.pending_options().iter().enumerate() {
            let label = option
                .args
                .first()
                .map(|v| v.to_string())
                .unwrap_or_default();
            println!("  {}. {}", i + 1, label);
        }

        let choice = match read_choice(vm.pending_options().len()) {
            Some(choice) => choice,
            None => break,
        };

        if let Err(e) = vm.go_to_option(choice) {
            eprintln!("Runtime error: {}", e);
            process::exit(1);
        }
    }
}

/// Block until the player presses enter. `false` on EOF.
fn wait_for_enter() -> bool {
    let mut line = String::new();
    matches!(io::stdin().lock().read_line(&mut line), Ok(n) if n > 0)
}

/// Prompt until the player enters a valid 1-based choice. `None` on EOF.
fn read_choice(count: usize) -> Option<usize> {
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => return None,
            Ok(_) => {}
        }

        match line.trim().parse::<usize>() {
            Ok(n) if n >= 1 && n <= count => return Some(n),
            _ => println!("enter a number between 1 and {}", count),
        }
    }
}
