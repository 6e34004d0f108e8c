use anyhow::Result;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;

use jatoc::config::Config;
use jatoc::ir::{
    BinOp, ClassDescriptor, ClassRef, FieldDescriptor, FieldRef, IdentitySource, JType,
    MethodDescriptor, MethodFlags, Program, Stmt, Tags, Value,
};
use jatoc::runtime;

#[derive(Parser)]
#[command(name = "jatoc")]
#[command(about = "Java-to-C ahead-of-time code generator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate C units for a built-in demo program
    Demo {
        /// Output directory for .h/.c files (prints to stdout when absent)
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// Skip the local optimizer
        #[arg(long)]
        no_optimize: bool,
    },

    /// Print the dispatch hash of a method signature
    SigHash {
        /// Method name, e.g. `run`
        name: String,

        /// Method descriptor, e.g. `(I)V`
        descriptor: String,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Demo { output, no_optimize } => demo(output.as_ref(), *no_optimize),
        Commands::SigHash { name, descriptor } => {
            println!("{:08x}", runtime::method_sig_hash(name, descriptor));
            Ok(())
        }
    }
}

fn demo(output: Option<&PathBuf>, no_optimize: bool) -> Result<()> {
    let program = demo_program();
    let config = if no_optimize {
        Config::default().without_optimizer()
    } else {
        Config::default()
    };

    for unit in jatoc::generate_all(&program, &config)? {
        match output {
            Some(dir) => {
                if !dir.exists() {
                    fs::create_dir_all(dir)?;
                }
                fs::write(dir.join(unit.header_file()), &unit.header)?;
                fs::write(dir.join(unit.body_file()), &unit.body)?;
                println!("wrote {} and {}", unit.header_file(), unit.body_file());
            }
            None => {
                println!("/* ===== {} ===== */", unit.header_file());
                print!("{}", unit.header);
                println!("/* ===== {} ===== */", unit.body_file());
                print!("{}", unit.body);
            }
        }
    }
    Ok(())
}

/// A small program exercising fields, constructors, virtual dispatch and
/// arithmetic: `class Point { int x, y; Point(int, int); int norm(); }`
fn demo_program() -> Program {
    let mut program = Program::new();

    let mut object = ClassDescriptor::new("java.lang.Object");
    let mut hash_code = MethodDescriptor::new("hashCode", vec![], JType::Int);
    hash_code.flags = MethodFlags {
        is_native: true,
        ..MethodFlags::default()
    };
    object.virtual_methods.push(hash_code);
    program.add_class(object);

    let point_ref = ClassRef::new("Point");
    let mut point = ClassDescriptor::new("Point");
    point.source_file = Some("Point.java".to_string());
    point.instance_fields.push(FieldDescriptor::new("x", JType::Int));
    point.instance_fields.push(FieldDescriptor::new("y", JType::Int));

    let this_ty = JType::Ref(point_ref.clone());
    let this_local = || Value::Local {
        index: 0,
        ty: JType::Ref(ClassRef::new("Point")),
    };
    let field = |name: &str| FieldRef {
        class: ClassRef::new("Point"),
        name: name.to_string(),
        ty: JType::Int,
    };
    let field_of_this = |name: &str| Value::InstanceField {
        base: Box::new(this_local()),
        field: field(name),
        tags: Tags {
            no_null_check: true,
            ..Tags::none()
        },
    };
    let int_local = |index: u16| Value::Local {
        index,
        ty: JType::Int,
    };

    let mut ctor = MethodDescriptor::new("<init>", vec![JType::Int, JType::Int], JType::Void);
    let mut body = jatoc::ir::Body::new(vec![this_ty.clone(), JType::Int, JType::Int]);
    body.push(
        Stmt::Identity {
            local: 0,
            ty: this_ty.clone(),
            source: IdentitySource::This,
        },
        Some(3),
    );
    body.push(
        Stmt::Identity {
            local: 1,
            ty: JType::Int,
            source: IdentitySource::Param(0),
        },
        Some(3),
    );
    body.push(
        Stmt::Identity {
            local: 2,
            ty: JType::Int,
            source: IdentitySource::Param(1),
        },
        Some(3),
    );
    body.push(
        Stmt::Assign {
            target: field_of_this("x"),
            value: int_local(1),
        },
        Some(4),
    );
    body.push(
        Stmt::Assign {
            target: field_of_this("y"),
            value: int_local(2),
        },
        Some(5),
    );
    body.push(Stmt::Return(None), Some(6));
    ctor.body = Some(body);
    point.constructors.push(ctor);

    let mut norm = MethodDescriptor::new("norm", vec![], JType::Int);
    let mut body = jatoc::ir::Body::new(vec![this_ty.clone()]);
    body.push(
        Stmt::Identity {
            local: 0,
            ty: this_ty,
            source: IdentitySource::This,
        },
        Some(8),
    );
    let square = |name: &str| Value::Binary {
        op: BinOp::Mul,
        lhs: Box::new(field_of_this(name)),
        rhs: Box::new(field_of_this(name)),
        ty: JType::Int,
    };
    body.push(
        Stmt::Return(Some(Value::Binary {
            op: BinOp::Add,
            lhs: Box::new(square("x")),
            rhs: Box::new(square("y")),
            ty: JType::Int,
        })),
        Some(9),
    );
    norm.body = Some(body);
    point.virtual_methods.push(norm);

    program.add_class(point);
    program
}
