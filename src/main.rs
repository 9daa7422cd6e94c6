// The interactive shell: a prompt loop that parses one command per line
// and executes it against a single table.

use std::io::{self, BufRead, Write};
use std::process;

use mindb::node::{
    COMMON_NODE_HEADER_SIZE, LEAF_NODE_CELL_SIZE, LEAF_NODE_HEADER_SIZE, LEAF_NODE_MAX_CELLS,
    LEAF_NODE_SPACE_FOR_CELLS,
};
use mindb::row::ROW_SIZE;
use mindb::statement::{prepare, Statement};
use mindb::{DbError, Table};

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        println!("Must supply a database filename.");
        process::exit(1);
    }

    let mut table = match Table::open(&args[1]) {
        Ok(table) => table,
        Err(e) => {
            println!("Error: {e}");
            process::exit(1);
        }
    };

    let stdin = io::stdin();
    let mut reader = stdin.lock();

    loop {
        print_prompt();

        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => {
                println!("Error reading input.");
                process::exit(1);
            }
            Ok(_) => {}
        }
        let input = line.trim_end_matches(['\n', '\r']);

        if input.starts_with('.') {
            match input {
                ".exit" => {
                    if let Err(e) = table.close() {
                        println!("Error: {e}");
                        process::exit(1);
                    }
                    process::exit(0);
                }
                ".btree" => {
                    println!("Tree:");
                    match table.tree_dump() {
                        Ok(dump) => print!("{dump}"),
                        Err(e) => fatal(e),
                    }
                }
                ".constants" => {
                    println!("Constants:");
                    print_constants();
                }
                _ => println!("Unrecognized command '{input}'"),
            }
            continue;
        }

        let statement = match prepare(input) {
            Ok(statement) => statement,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };

        match statement {
            Statement::Insert(row) => match table.insert(&row) {
                Ok(()) => println!("Executed."),
                Err(DbError::DuplicateKey) => println!("Error: Duplicate key."),
                Err(DbError::TableFull) => println!("Error: Table full."),
                Err(e) => fatal(e),
            },
            Statement::Select => match table.select() {
                Ok(rows) => {
                    for row in &rows {
                        println!("{row}");
                    }
                    println!("Executed.");
                }
                Err(e) => fatal(e),
            },
        }
    }
}

fn print_prompt() {
    print!("db > ");
    let _ = io::stdout().flush();
}

fn print_constants() {
    println!("ROW_SIZE: {ROW_SIZE}");
    println!("COMMON_NODE_HEADER_SIZE: {COMMON_NODE_HEADER_SIZE}");
    println!("LEAF_NODE_HEADER_SIZE: {LEAF_NODE_HEADER_SIZE}");
    println!("LEAF_NODE_CELL_SIZE: {LEAF_NODE_CELL_SIZE}");
    println!("LEAF_NODE_SPACE_FOR_CELLS: {LEAF_NODE_SPACE_FOR_CELLS}");
    println!("LEAF_NODE_MAX_CELLS: {LEAF_NODE_MAX_CELLS}");
}

fn fatal(e: DbError) -> ! {
    println!("Error: {e}");
    process::exit(1);
}
