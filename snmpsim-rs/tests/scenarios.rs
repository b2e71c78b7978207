use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use pretty_assertions::assert_eq;
use snmpsim::codec;
use snmpsim::script::{parse_program, Interpreter, Program, RuntimeError, ScriptError};
use snmpsim::snmp::pdu::status;
use snmpsim::snmp::{Agent, Message, Pdu, PduKind, VarBind, VarValue, Version};
use snmpsim::store::ValueStore;
use snmpsim::value::Value;

fn scripts_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .join("scripts")
}

fn load(name: &str) -> Program {
    let path = scripts_dir().join(name);
    let src = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()));
    parse_program(&src).unwrap_or_else(|e| panic!("{}: {e}", path.display()))
}

fn run(src: &str) -> (Arc<ValueStore>, Vec<String>, Result<(), RuntimeError>) {
    let program = parse_program(src).expect("parse failed");
    let (store, inbox) = ValueStore::load(&program.types);
    let store = Arc::new(store);
    let mut interp = Interpreter::new(&program, Arc::clone(&store), inbox, Vec::new());
    let result = interp.run();
    (store, interp.into_console(), result)
}

/// Every bundled script must load.
#[test]
fn parse_all_bundled_scripts() {
    let dir = scripts_dir();
    let mut entries: Vec<_> = std::fs::read_dir(&dir)
        .unwrap_or_else(|e| panic!("cannot open {}: {e}", dir.display()))
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().map(|x| x == "sim").unwrap_or(false))
        .collect();
    entries.sort_by_key(|e| e.path());
    assert!(!entries.is_empty(), "no .sim files found in {}", dir.display());

    let mut failures = Vec::new();
    for entry in &entries {
        let path = entry.path();
        let src = std::fs::read_to_string(&path).unwrap();
        if let Err(e) = parse_program(&src) {
            failures.push(format!("{}: {e}", path.display()));
        }
    }
    assert!(failures.is_empty(), "failed to parse:\n  {}", failures.join("\n  "));
}

#[test]
fn mixed_statement_walkthrough() {
    let src = r#"var
	   test: string
	   x: integer
	   y: integer
	   i: integer
	   doit: boolean
	   this-boy: boolean
	endvar

	run
	    this-boy = true
	    x = 3 + 1000000 + 2 +
	          4 + 6
	    doit = x = 1000015
	    x = 3
		test = "hello"

		y = x + 3
		print "y =  " + strInt(y)

		if y > 3
			test = "super"
		elseif y < 3
		    test = "wonder"
		else
		    test = "duper"
		endif

		print test
		test = test + "r"
		print test

		loop times 10
		    i = i + 1
		endloop

		print "i = " + strInt(i) + " " + strBool(doit & this-boy)
	endrun
	"#;
    let (store, output, result) = run(src);
    result.unwrap();
    assert_eq!(output, vec!["y =  6", "super", "superr", "i = 10 true"]);
    assert_eq!(store.read("test"), Some(Value::Str("superr".into())));
    assert_eq!(store.read("i"), Some(Value::Integer(10)));
}

#[test]
fn parse_errors_carry_lines() {
    let cases: &[(&str, usize)] = &[
        ("var\n x: integer\nendvar\nrun\n x = true\nendrun\n", 5),
        ("var\n x: integer\nendvar\nrun\n\n y = 1\nendrun\n", 6),
        ("var\n x: integer\nendvar\nrun\n x = 'nothing'\nendrun\n", 5),
        ("var\n x: integer\n x: string\nendvar\nrun\nendrun\n", 3),
        ("run\n loop\n  exit\nendrun\n", 4),
        ("run\n print \"open\nendrun\n", 2),
    ];
    for (src, line) in cases {
        let err: ScriptError = parse_program(src).unwrap_err();
        assert_eq!(err.line(), *line, "{src:?}: {err}");
    }
}

#[test]
fn printer_script_declarations() {
    let program = load("printer.sim");
    let types = &program.types;
    assert_eq!(
        types.get("sys-descr").unwrap().oid.as_deref(),
        Some(".1.3.6.1.2.1.1.1.0")
    );
    assert_eq!(types.alias("no-paper"), Some(2));
    assert_eq!(types.get("engine").unwrap().layout.as_ref().unwrap().size(), 4);
    assert!(types.get("job").unwrap().oid.is_none());
}

/// Drive the blocking handshake script through the agent.
#[test]
fn blocking_handshake_through_agent() {
    let program = load("handshake.sim");
    let (store, inbox) = ValueStore::load(&program.types);
    let store = Arc::new(store);
    let agent = Agent::new(Arc::clone(&store), "public", "private");

    let interp = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            Interpreter::new(&program, store, inbox, Vec::new()).run()
        })
    };

    let command = codec::parse_oid(".1.3.6.1.4.1.99999.2.1").unwrap();
    let set = |n: i64| Message {
        version: Version::V2c,
        community: b"private".to_vec(),
        pdu: Pdu {
            kind: PduKind::Set,
            request_id: n,
            error_status: 0,
            error_index: 0,
            varbinds: vec![VarBind {
                oid: command.clone(),
                value: VarValue::Integer(n),
            }],
        },
    };

    for _ in 0..3 {
        let resp = agent.handle(set(1)).unwrap();
        assert_eq!(resp.pdu.error_status, status::NO_ERROR);
    }
    let resp = agent.handle(set(0)).unwrap();
    assert_eq!(resp.pdu.error_status, status::NO_ERROR);
    interp.join().unwrap().unwrap();

    assert_eq!(store.get(".1.3.6.1.4.1.99999.2.3"), Some(Value::Counter(3)));
    assert_eq!(store.get(".1.3.6.1.4.1.99999.2.2"), Some(Value::Str("pong 3".into())));

    // The interpreter is gone; nobody will take the value.
    let resp = agent.handle(set(1)).unwrap();
    assert_eq!(resp.pdu.error_status, status::GEN_ERR);
}
