//! Interactive menu-driven front end for an in-process [`flowdev::Engine`].
//!
//! Grounded on `original_source/src/user/user.c`'s `do_work` menu (write /
//! read / switch priority / set blocking / set non-blocking / enable /
//! disable / exit) and on `rusty-db`'s `cli.rs` banner/prompt-loop idiom.
//! There is no real device node or network socket to open here — this CLI
//! drives the library API directly, the same relationship the original
//! menu had to the kernel module it `open()`ed.

use std::io::{self, Write};

use flowdev::{Config, ControlCommand, Engine, FlowError, Session, VERSION};

const CHOICES: &[&str] = &[
    "1 | Write to the endpoint",
    "2 | Read from the endpoint",
    "3 | Switch to high priority flow",
    "4 | Switch to low priority flow",
    "5 | Make operations blocking",
    "6 | Make operations non-blocking",
    "7 | Enable this endpoint",
    "8 | Disable this endpoint",
    "9 | Exit",
];

fn main() {
    println!("flowdev CLI v{VERSION}");
    println!("an in-process client for the flow engine\n");

    let engine = Engine::new(Config::default());
    let endpoint_id = prompt_endpoint_id();

    println!("opening endpoint {endpoint_id}");
    let mut session = match engine.open(endpoint_id) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("open error on endpoint {endpoint_id}: {e}");
            return;
        }
    };
    println!("endpoint {endpoint_id} successfully opened\n");

    loop {
        print_menu();
        let choice = match prompt_line("> ").trim().parse::<u32>() {
            Ok(c) => c,
            Err(_) => {
                println!("the choice inserted is not valid\n");
                continue;
            }
        };

        match choice {
            1 => do_write(&engine, &session),
            2 => do_read(&engine, &session),
            3 => do_control(&engine, &mut session, ControlCommand::SetPriority, 1),
            4 => do_control(&engine, &mut session, ControlCommand::SetPriority, 0),
            5 => do_set_blocking(&engine, &mut session),
            6 => do_control(&engine, &mut session, ControlCommand::SetBlocking, 0),
            7 => do_control(&engine, &mut session, ControlCommand::SetEnabled, 0),
            8 => do_control(&engine, &mut session, ControlCommand::SetEnabled, 1),
            9 => break,
            _ => println!("the choice inserted is not valid\n"),
        }
    }

    println!("closing endpoint {endpoint_id}");
    engine.close(session);
    engine.shutdown();
}

fn print_menu() {
    println!("what operation do you want to perform?");
    for choice in CHOICES {
        println!("  {choice}");
    }
}

fn prompt_endpoint_id() -> usize {
    loop {
        match prompt_line("endpoint id to open: ").trim().parse() {
            Ok(id) => return id,
            Err(_) => println!("not a valid endpoint id"),
        }
    }
}

fn prompt_line(prompt: &str) -> String {
    print!("{prompt}");
    io::stdout().flush().ok();
    let mut line = String::new();
    io::stdin().read_line(&mut line).ok();
    line
}

fn do_write(engine: &Engine, session: &Session) {
    let data = prompt_line("insert the data you want to write (max 4096): ");
    let data = data.trim_end_matches(['\n', '\r']);
    match engine.write(session, data.as_bytes()) {
        Ok(n) => println!("write result ({n} bytes): operation completed successfully\n"),
        Err(e) => println!("write result: {}\n", describe(e)),
    }
}

fn do_read(engine: &Engine, session: &Session) {
    let len_line = prompt_line("insert the amount of data you want to read (max 4096): ");
    let requested: usize = match len_line.trim().parse() {
        Ok(n) => n,
        Err(_) => {
            println!("the amount of data inserted is not valid\n");
            return;
        }
    };
    match engine.read(session, requested.min(4096)) {
        Ok(bytes) if bytes.is_empty() => println!("read result: no data was read from the endpoint\n"),
        Ok(bytes) => {
            let text = String::from_utf8_lossy(&bytes);
            println!("read result ({} bytes): {text}\n", bytes.len());
        }
        Err(e) => println!("read result: {}\n", describe(e)),
    }
}

fn do_set_blocking(engine: &Engine, session: &mut Session) {
    let timeout_line =
        prompt_line("insert the timeout value, in time units (1 unit = 10 milliseconds): ");
    let timeout: u64 = match timeout_line.trim().parse() {
        Ok(t) if t > 0 => t,
        _ => {
            println!("the timeout is not valid\n");
            return;
        }
    };
    do_control(engine, session, ControlCommand::SetBlocking, timeout as u32);
}

fn do_control(engine: &Engine, session: &mut Session, command: ControlCommand, arg: u32) {
    match engine.control(session, command, arg) {
        Ok(()) => println!("operation completed successfully\n"),
        Err(e) => println!("control error: {}\n", describe(e)),
    }
}

fn describe(e: FlowError) -> String {
    match e {
        FlowError::WouldBlock => "would block (no data available yet)".to_string(),
        FlowError::NoSpace => "no space available within timeout".to_string(),
        FlowError::Interrupted => "operation interrupted".to_string(),
        other => other.to_string(),
    }
}
