//! Sumire CLI - コマンドラインインターフェース
//!
//! シミュレートされたデバッグターゲットの上で値インスペクションを試す
//! REPLインターフェース

mod command;

use anyhow::Result;
use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::debug;

use command::Command;
use sumire_core::{
    decode_code_units, BreakpointCondition, DebugThread, EvaluationGateway, EvaluationResult,
    FieldInfo, RemoteValue, StackFrame, StringReader, TypeInfo,
};
use sumire_target::{SimFrame, SimTarget, SimThread, SiteTable, TargetMemory};

/// Sumire - Live Value Inspector
#[derive(Parser)]
#[command(name = "sumire")]
#[command(version = "0.1.0")]
#[command(about = "Inspect live values on a simulated debug target", long_about = None)]
struct Cli {
    /// ログフィルタ（未指定ならRUST_LOGを使う。例: debug, sumire_core=debug）
    #[arg(long)]
    log: Option<String>,
}

/// REPLで操作する1回分のデバッグセッション
struct Session {
    target: SimTarget,
    thread: SimThread,
    sites: SiteTable,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log.as_deref());

    println!("Sumire - Live Value Inspector");
    println!("Version 0.1.0");
    println!();

    let mut session = build_demo_session()?;
    println!("Demo target loaded: thread 1 stopped in process_order()");
    println!("Locals: x, msg, sp (Shape* that is really a Circle), nil, wname, tail");
    println!();

    run_repl(&mut session)?;

    Ok(())
}

fn init_tracing(filter: Option<&str>) {
    match filter {
        Some(filter) => tracing_subscriber::fmt().with_env_filter(filter).init(),
        None => tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .init(),
    }
}

/// REPLループを実行する
fn run_repl(session: &mut Session) -> Result<()> {
    println!("Type 'help' for available commands, 'quit' to exit.");
    println!();

    let mut rl = DefaultEditor::new()?;

    loop {
        let readline = rl.readline("(sumire) ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line)?;

                if let Err(e) = handle_command(session, line) {
                    eprintln!("Error: {}", e);
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}

fn handle_command(session: &mut Session, line: &str) -> Result<()> {
    match Command::parse(line) {
        Some(Command::Print(expression)) => handle_print(session, &expression),
        Some(Command::View { base, expression }) => handle_view(session, &base, &expression),
        Some(Command::Compile { base, expression }) => handle_compile(session, &base, &expression),
        Some(Command::Str {
            expression,
            char_width,
            max_chars,
        }) => handle_str(session, &expression, char_width, max_chars),
        Some(Command::Vars) => handle_vars(session),
        Some(Command::Frames) => handle_frames(session),
        Some(Command::Frame(index)) => handle_frame(session, index),
        Some(Command::Break(location)) => handle_break(session, &location),
        Some(Command::Condition { site, expression }) => {
            handle_condition(session, site, expression.as_deref())
        }
        Some(Command::Sites) => handle_sites(session),
        Some(Command::Hit(site)) => handle_hit(session, site),
        Some(Command::Memory { address, length }) => handle_memory(session, &address, length),
        Some(Command::Help) => {
            print_help();
            Ok(())
        }
        Some(Command::Quit) => {
            handle_quit();
            Ok(())
        }
        None => {
            println!("Unknown command: {}", line);
            println!("Type 'help' for available commands.");
            Ok(())
        }
    }
}

/// Quitコマンドを処理する
fn handle_quit() {
    println!("Goodbye!");
    std::process::exit(0);
}

/// 選択中のフレームを取り出す。なければメッセージを表示してNoneを返す
fn selected_frame(session: &Session) -> Option<Box<dyn StackFrame>> {
    let frame = session.thread.selected_frame();
    if frame.is_none() {
        println!("No frame selected");
    }
    frame
}

fn handle_print(session: &mut Session, expression: &str) -> Result<()> {
    let frame = match selected_frame(session) {
        Some(frame) => frame,
        None => return Ok(()),
    };

    let gateway = EvaluationGateway::new(&session.target);
    print_result(gateway.evaluate(frame.as_ref(), expression));
    Ok(())
}

fn handle_view(session: &mut Session, base: &str, expression: &str) -> Result<()> {
    let frame = match selected_frame(session) {
        Some(frame) => frame,
        None => return Ok(()),
    };

    let gateway = EvaluationGateway::new(&session.target);
    let base_result = gateway.evaluate(frame.as_ref(), base);
    let base_value = match (base_result.value, base_result.error) {
        (Some(value), None) => value,
        _ => {
            println!("Cannot evaluate base '{}'", base);
            return Ok(());
        }
    };

    print_result(gateway.evaluate_on_value(
        base_value.as_ref(),
        expression,
        std::collections::HashMap::new(),
    ));
    Ok(())
}

fn handle_compile(session: &mut Session, base: &str, expression: &str) -> Result<()> {
    let frame = match selected_frame(session) {
        Some(frame) => frame,
        None => return Ok(()),
    };

    let gateway = EvaluationGateway::new(&session.target);
    let base_result = gateway.evaluate(frame.as_ref(), base);
    let scope = match (base_result.value, base_result.error) {
        (Some(value), None) => value.type_info().clone(),
        _ => {
            println!("Cannot evaluate base '{}'", base);
            return Ok(());
        }
    };

    let result = gateway.compile(&scope, expression, std::collections::HashMap::new());
    match (result.compiled_type, result.error) {
        (Some(compiled_type), None) => {
            println!("'{}' compiles to type {}", expression, compiled_type.name())
        }
        (_, Some(error)) => println!("Error: {}", error),
        (None, None) => println!("Error: compilation produced no type"),
    }
    Ok(())
}

fn handle_str(session: &mut Session, expression: &str, char_width: usize, max_chars: u32) -> Result<()> {
    if char_width != 1 && char_width != 2 && char_width != 4 {
        println!("Unsupported char width {} (use 1, 2 or 4)", char_width);
        return Ok(());
    }

    let frame = match selected_frame(session) {
        Some(frame) => frame,
        None => return Ok(()),
    };

    let gateway = EvaluationGateway::new(&session.target);
    let result = gateway.evaluate(frame.as_ref(), expression);
    let value = match (result.value, result.error) {
        (Some(value), None) => value,
        _ => {
            println!("Cannot evaluate '{}'", expression);
            return Ok(());
        }
    };

    let reader = StringReader::new(&session.target);
    match reader.read_string(value.as_ref(), char_width, max_chars) {
        Ok(bytes) => println!(
            "({}) {} = \"{}\"",
            value.type_info().name(),
            value.name(),
            decode_code_units(&bytes, char_width)
        ),
        // ソフト失敗は診断テキストとしてそのまま表示する
        Err(error) => println!(
            "({}) {} = {}",
            value.type_info().name(),
            value.name(),
            error
        ),
    }
    Ok(())
}

fn handle_vars(session: &mut Session) -> Result<()> {
    let frame = match selected_frame(session) {
        Some(frame) => frame,
        None => return Ok(()),
    };

    let variables = session.target.variables_in_frame(frame.id());
    if variables.is_empty() {
        println!("No variables in this frame");
        return Ok(());
    }

    let gateway = EvaluationGateway::new(&session.target);
    for variable in variables {
        let result = gateway.evaluate(frame.as_ref(), &variable.name);
        match result.value {
            Some(value) => println!("  {}", render_value(value.as_ref())),
            None => println!("  {} = <unavailable>", variable.name),
        }
    }
    Ok(())
}

fn handle_frames(session: &mut Session) -> Result<()> {
    for (index, frame) in session.thread.frames().iter().enumerate() {
        let marker = if session.thread.selected_index() == Some(index) {
            "*"
        } else {
            " "
        };
        println!(" {} #{} {}()", marker, index, frame.function_name());
    }
    Ok(())
}

fn handle_frame(session: &mut Session, index: usize) -> Result<()> {
    session.thread.select_frame(index)?;
    if let Some(frame) = session.thread.selected_frame() {
        println!("Selected frame #{} {}()", index, frame.function_name());
    }
    Ok(())
}

fn handle_break(session: &mut Session, location: &str) -> Result<()> {
    let address = parse_address(location)?;
    let id = session.sites.add(address);
    println!("Breakpoint site {} set at 0x{:x}", id, address);
    Ok(())
}

fn handle_condition(session: &mut Session, site: usize, expression: Option<&str>) -> Result<()> {
    match expression {
        Some(expression) => {
            session
                .sites
                .set_condition(site, BreakpointCondition::new(expression))?;
            println!("Site {} stops when '{}' is true", site, expression);
        }
        None => {
            session.sites.clear_condition(site)?;
            println!("Site {} stops unconditionally", site);
        }
    }
    Ok(())
}

fn handle_sites(session: &mut Session) -> Result<()> {
    let sites = session.sites.sites();
    if sites.is_empty() {
        println!("No breakpoint sites");
        return Ok(());
    }
    for site in sites {
        let condition = site
            .condition()
            .map(|condition| condition.text().to_string())
            .unwrap_or_else(|| "<none>".to_string());
        println!(
            "  {}: 0x{:x}  hits: {}  condition: {}",
            site.id(),
            site.address(),
            site.hit_count(),
            condition
        );
    }
    Ok(())
}

fn handle_hit(session: &mut Session, site: usize) -> Result<()> {
    let gateway = EvaluationGateway::new(&session.target);
    let stop = session
        .sites
        .notify_hit(site, &gateway, &session.thread)?;
    debug!("site {} stop decision: {}", site, stop);

    if stop {
        let hits = session.sites.get(site).map(|s| s.hit_count()).unwrap_or(0);
        println!("Site {} stops here (hit count {})", site, hits);
    } else {
        println!("Site {} does not stop here", site);
    }
    Ok(())
}

fn handle_memory(session: &mut Session, address: &str, length: usize) -> Result<()> {
    let address = parse_address(address)?;
    let bytes = session.target.read_memory(address, length)?;

    for (index, chunk) in bytes.chunks(16).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|byte| format!("{:02x}", byte)).collect();
        println!("0x{:08x}: {}", address + (index * 16) as u64, hex.join(" "));
    }
    if bytes.len() < length {
        println!("... region ends after {} bytes", bytes.len());
    }
    Ok(())
}

/// 16進数のアドレス表記をパースする
fn parse_address(text: &str) -> Result<u64> {
    let digits = text.trim_start_matches("0x").trim_start_matches("0X");
    u64::from_str_radix(digits, 16).map_err(|_| anyhow::anyhow!("invalid address '{}'", text))
}

fn print_result(result: EvaluationResult) {
    match (result.value, result.error) {
        (Some(value), None) => println!("{}", render_value(value.as_ref())),
        (_, Some(error)) => println!("Error: {}", error),
        (None, None) => println!("Error: evaluation produced no value"),
    }
}

/// 値を1行のテキストに整形する
fn render_value(value: &dyn RemoteValue) -> String {
    if let Some(error) = value.error() {
        return format!("{} = <error: {}>", value.name(), error);
    }
    let rendered = match value.type_info() {
        TypeInfo::Pointer { .. } => format!("0x{:x}", value.as_unsigned()),
        TypeInfo::Class { .. } => {
            let fields: Vec<String> = (0..value.num_children())
                .filter_map(|index| value.child_at(index))
                .map(|child| format!("{} = {}", child.name(), child.as_unsigned()))
                .collect();
            format!("{{ {} }}", fields.join(", "))
        }
        TypeInfo::Array { .. } => {
            let elements: Vec<String> = (0..value.num_children())
                .filter_map(|index| value.child_at(index))
                .map(|child| child.as_unsigned().to_string())
                .collect();
            format!("[{}]", elements.join(", "))
        }
        _ => value.as_unsigned().to_string(),
    };
    format!(
        "({}) {} = {}",
        value.type_info().name(),
        value.name(),
        rendered
    )
}

fn int_type() -> TypeInfo {
    TypeInfo::Primitive {
        name: "int".to_string(),
        size: 4,
    }
}

fn char_type(width: usize) -> TypeInfo {
    let name = match width {
        1 => "char",
        2 => "char16_t",
        _ => "char32_t",
    };
    TypeInfo::Primitive {
        name: name.to_string(),
        size: width,
    }
}

fn pointer_to(pointee: TypeInfo) -> TypeInfo {
    TypeInfo::Pointer {
        pointee: Some(Box::new(pointee)),
        size: 8,
    }
}

fn shape_type() -> TypeInfo {
    TypeInfo::Class {
        name: "Shape".to_string(),
        size: 16,
        polymorphic: true,
        fields: vec![FieldInfo {
            name: "kind".to_string(),
            offset: 0,
            type_info: int_type(),
        }],
    }
}

fn circle_type() -> TypeInfo {
    TypeInfo::Class {
        name: "Circle".to_string(),
        size: 16,
        polymorphic: true,
        fields: vec![
            FieldInfo {
                name: "kind".to_string(),
                offset: 0,
                type_info: int_type(),
            },
            FieldInfo {
                name: "radius".to_string(),
                offset: 4,
                type_info: int_type(),
            },
        ],
    }
}

/// 組み込みのデモシナリオでセッションを構築する
///
/// スレッド1がprocess_order()で停止している想定で、典型的なローカル変数を
/// 並べたメモリレイアウトを作る。
fn build_demo_session() -> Result<Session> {
    let mut memory = TargetMemory::new();

    // ローカル変数領域
    //   0x1000: x     = 5 (int)
    //   0x1008: msg   -> 0x2000 (char*)
    //   0x1010: sp    -> 0x3000 (Shape*)
    //   0x1018: nil   = NULL (char*)
    //   0x1028: total = 100 (int, mainフレーム)
    //   0x1030: tail  (char[0])
    let mut locals = vec![0u8; 64];
    locals[..4].copy_from_slice(&5i32.to_le_bytes());
    locals[8..16].copy_from_slice(&0x2000u64.to_le_bytes());
    locals[16..24].copy_from_slice(&0x3000u64.to_le_bytes());
    locals[40..44].copy_from_slice(&100i32.to_le_bytes());
    memory.map_region(0x1000, locals)?;

    memory.map_region(0x2000, b"hello, world\0".to_vec())?;

    // UTF-16LEの"hello"と終端
    let mut wide = Vec::new();
    for unit in "hello".encode_utf16() {
        wide.extend_from_slice(&unit.to_le_bytes());
    }
    wide.extend_from_slice(&[0, 0]);
    memory.map_region(0x2100, wide)?;

    // Circleとして構築されたオブジェクト: kind = 2, radius = 7
    let mut object = vec![0u8; 16];
    object[..4].copy_from_slice(&2i32.to_le_bytes());
    object[4..8].copy_from_slice(&7i32.to_le_bytes());
    memory.map_region(0x3000, object)?;

    let mut target = SimTarget::new(memory);
    target.add_variable(0, "x", 0x1000, int_type());
    target.add_variable(0, "msg", 0x1008, pointer_to(char_type(1)));
    target.add_variable(0, "sp", 0x1010, pointer_to(shape_type()));
    target.add_variable(0, "nil", 0x1018, pointer_to(char_type(1)));
    target.add_variable(
        0,
        "wname",
        0x2100,
        TypeInfo::Array {
            element: Some(Box::new(char_type(2))),
            length: Some(6),
        },
    );
    target.add_variable(
        0,
        "tail",
        0x1030,
        TypeInfo::Array {
            element: Some(Box::new(char_type(1))),
            length: Some(0),
        },
    );
    target.add_variable(1, "total", 0x1028, int_type());
    target.set_dynamic_type(0x3000, circle_type());

    let thread = SimThread::new(
        1,
        vec![SimFrame::new(0, "process_order"), SimFrame::new(1, "main")],
    );

    Ok(Session {
        target,
        thread,
        sites: SiteTable::new(),
    })
}

fn print_help() {
    println!("Available commands:");
    println!();
    println!("  help               - Show this help message");
    println!("  quit/exit/q        - Exit the inspector");
    println!();
    println!("Inspection commands:");
    println!("  print <expr> (p)   - Evaluate an expression in the selected frame");
    println!("  view <base> <expr> - Evaluate an expression with an existing value as scope");
    println!("  compile <base> <expr> - Type-check an expression without running it");
    println!("  str <expr> [w] [n] - Read a string (w: char width 1/2/4, n: max chars)");
    println!("  vars               - Show variables in the selected frame");
    println!();
    println!("Frame commands:");
    println!("  frames (bt)        - List stack frames");
    println!("  frame <n> (f)      - Select frame n");
    println!();
    println!("Breakpoint commands:");
    println!("  break <addr> (b)   - Add a breakpoint site at a hex address");
    println!("  cond <id> [expr]   - Set (or clear) the stop condition of a site");
    println!("  sites              - List breakpoint sites");
    println!("  hit <id>           - Simulate hitting a site and show the stop decision");
    println!();
    println!("Memory commands:");
    println!("  mem <addr> [len] (x) - Dump target memory");
    println!();
    println!("Examples:");
    println!("  print *sp");
    println!("  print x = 9");
    println!("  str msg");
    println!("  str wname 2");
    println!("  break 0x3000");
    println!("  cond 1 x == 9");
    println!("  hit 1");
}
