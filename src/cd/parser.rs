//! Parser for the class description language. There is noticeable symmetry
//! with the binary class file decoder; when changing one, consider the
//! other.

use std::collections::BTreeMap;

use hashbrown::HashMap;

use crate::cd::lexer::{Lexer, Token};
use crate::cd::ParserError;
use crate::class::constant::{Constant, ConstantPool, ConstantPoolBuilder, ConstantTag, PoolIndex};
use crate::class::{AccessFlags, Class, Field, Method};
use crate::instruction::{BciMap, BciType, Instruction};

fn unexpected<T>(message: impl Into<String>) -> Result<T, ParserError> {
    Err(ParserError::Unexpected(message.into()))
}

fn expect(lexer: &mut Lexer, token: Token) -> Result<(), ParserError> {
    if lexer.eat(&token) {
        return Ok(());
    }
    unexpected(format!("Expected {:?}", token))
}

fn expect_keyword(lexer: &mut Lexer, keyword: &str) -> Result<(), ParserError> {
    if lexer.eat_keyword(keyword) {
        return Ok(());
    }
    unexpected(format!("Expected keyword {:?}", keyword))
}

fn expect_num(lexer: &mut Lexer) -> Result<u32, ParserError> {
    match lexer.next() {
        Some(Token::Num(value)) => Ok(value),
        other => unexpected(format!("Expected a number, found {:?}", other)),
    }
}

fn expect_id(lexer: &mut Lexer) -> Result<String, ParserError> {
    match lexer.next() {
        Some(Token::Id(id)) => Ok(id),
        other => unexpected(format!("Expected an identifier, found {:?}", other)),
    }
}

fn expect_id_exact(lexer: &mut Lexer, id: &str) -> Result<(), ParserError> {
    if lexer.eat(&Token::Id(id.to_string())) {
        return Ok(());
    }
    unexpected(format!("Expected {:?}", id))
}

fn expect_str(lexer: &mut Lexer) -> Result<String, ParserError> {
    match lexer.next() {
        Some(Token::Str(value)) => Ok(value),
        other => unexpected(format!("Expected a string, found {:?}", other)),
    }
}

/// Parses `#<number>` or returns `None` without consuming anything.
fn try_parse_cp_index(lexer: &mut Lexer) -> Result<Option<PoolIndex>, ParserError> {
    if !lexer.eat(&Token::Sharp) {
        return Ok(None);
    }
    Ok(Some(expect_num(lexer)? as PoolIndex))
}

fn parse_cp_index(lexer: &mut Lexer) -> Result<PoolIndex, ParserError> {
    match try_parse_cp_index(lexer)? {
        Some(index) => Ok(index),
        None => unexpected("Expected constant pool index"),
    }
}

fn find_string_in_pool(pool: &ConstantPool, target: &str) -> bool {
    (1..=pool.len()).any(|index| matches!(pool.get(index), Some(Constant::Utf8(s)) if s == target))
}

pub(super) fn parse_class(lexer: &mut Lexer) -> Result<Class, ParserError> {
    if !lexer.has_next() {
        return unexpected("Unexpected empty input");
    }

    expect_keyword(lexer, "class")?;
    expect(lexer, Token::LBrace)?;

    let pool = parse_constant_pool(lexer)?;

    expect_id_exact(lexer, "Name")?;
    expect(lexer, Token::Colon)?;
    let name_index = parse_cp_index(lexer)?;
    if pool.class_name(name_index).is_err() {
        return unexpected("Class name cp record has unexpected type");
    }

    expect_id_exact(lexer, "Super")?;
    expect(lexer, Token::Colon)?;
    let super_index = parse_cp_index(lexer)?;
    if pool.class_name(super_index).is_err() {
        return unexpected("Super class name cp record has unexpected type");
    }

    let mut fields = Vec::new();
    if lexer.is_next_keyword("fields") {
        fields = parse_class_fields(lexer, &pool)?;
    }

    let mut methods = Vec::new();
    while lexer.is_next_keyword("method") {
        methods.push(parse_method(lexer, &pool)?);
    }

    expect(lexer, Token::RBrace)?;

    let class = Class::new(
        AccessFlags::PUBLIC | AccessFlags::SUPER,
        name_index,
        Some(super_index),
        fields,
        methods,
        pool,
    )?;
    Ok(class)
}

#[derive(Debug)]
enum RecordArg {
    Index(PoolIndex),
    Text(String),
}

fn parse_constant_pool(lexer: &mut Lexer) -> Result<ConstantPool, ParserError> {
    if !lexer.eat_keyword("constant_pool") {
        return unexpected("Expected constant_pool as a first member of the class");
    }
    expect(lexer, Token::LBrace)?;

    // Records are gathered first: free standing strings receive their pool
    // indexes only after every explicitly numbered record is known.
    let mut parsed: BTreeMap<PoolIndex, (String, Vec<RecordArg>)> = BTreeMap::new();
    let mut strings: BTreeMap<String, PoolIndex> = BTreeMap::new();
    let mut max_index: PoolIndex = 0;

    loop {
        if lexer.is_next(&Token::RBrace) {
            break;
        }

        if lexer.is_next_num() {
            // "<number>: <RecordType> <args>..."
            let index = expect_num(lexer)? as PoolIndex;
            if index == 0 {
                return unexpected("Constant pool index should be greater than zero");
            }
            if parsed.contains_key(&index) {
                return unexpected(format!("Duplicated constant pool index found: {}", index));
            }
            max_index = max_index.max(index);

            expect(lexer, Token::Colon)?;
            let record_type = expect_id(lexer)?;

            let mut args = Vec::new();
            loop {
                if let Some(arg_index) = try_parse_cp_index(lexer)? {
                    args.push(RecordArg::Index(arg_index));
                } else if lexer.is_next_str() {
                    let text = expect_str(lexer)?;
                    strings.entry(text.clone()).or_insert(0);
                    args.push(RecordArg::Text(text));
                } else {
                    break;
                }
            }

            parsed.insert(index, (record_type, args));
        } else if lexer.eat_keyword("auto") {
            // "auto: <string>"
            expect(lexer, Token::Colon)?;
            let text = expect_str(lexer)?;
            strings.entry(text).or_insert(0);
        } else {
            return unexpected("Expected RBrace at the end of constant pool");
        }
    }
    expect(lexer, Token::RBrace)?;

    // Allocate pool indexes for the free standing strings
    for index in strings.values_mut() {
        max_index += 1;
        *index = max_index;
    }

    let mut builder = ConstantPoolBuilder::new(max_index);

    let arg_index = |arg: &RecordArg, strings: &BTreeMap<String, PoolIndex>| match arg {
        RecordArg::Index(index) => *index,
        RecordArg::Text(text) => strings[text],
    };

    for (index, (record_type, args)) in &parsed {
        match record_type.as_str() {
            "ClassInfo" => {
                if args.len() != 1 {
                    return unexpected("ClassInfo record should have exactly one argument");
                }
                let name = builder.cell_ref(arg_index(&args[0], &strings), ConstantTag::Utf8)?;
                builder.set(*index, Constant::Class { name_index: name })?;
            }
            "NameAndType" => {
                if args.len() != 2 {
                    return unexpected("NameAndType record should have exactly two arguments");
                }
                let name = builder.cell_ref(arg_index(&args[0], &strings), ConstantTag::Utf8)?;
                let descriptor =
                    builder.cell_ref(arg_index(&args[1], &strings), ConstantTag::Utf8)?;
                builder.set(
                    *index,
                    Constant::NameAndType {
                        name_index: name,
                        descriptor_index: descriptor,
                    },
                )?;
            }
            "MethodRef" => {
                if args.len() != 2 {
                    return unexpected("MethodRef record should have exactly two arguments");
                }
                let class = builder.cell_ref(arg_index(&args[0], &strings), ConstantTag::Class)?;
                let name_and_type =
                    builder.cell_ref(arg_index(&args[1], &strings), ConstantTag::NameAndType)?;
                builder.set(
                    *index,
                    Constant::MethodRef {
                        class_index: class,
                        name_and_type_index: name_and_type,
                    },
                )?;
            }
            "FieldRef" => {
                if args.len() != 2 {
                    return unexpected("FieldRef record should have exactly two arguments");
                }
                let class = builder.cell_ref(arg_index(&args[0], &strings), ConstantTag::Class)?;
                let name_and_type =
                    builder.cell_ref(arg_index(&args[1], &strings), ConstantTag::NameAndType)?;
                builder.set(
                    *index,
                    Constant::FieldRef {
                        class_index: class,
                        name_and_type_index: name_and_type,
                    },
                )?;
            }
            other => return unexpected(format!("Unknown record type {:?}", other)),
        }
    }

    for (text, index) in &strings {
        builder.set(*index, Constant::Utf8(text.clone()))?;
    }

    Ok(builder.seal()?)
}

fn parse_class_fields(lexer: &mut Lexer, pool: &ConstantPool) -> Result<Vec<Field>, ParserError> {
    expect_keyword(lexer, "fields")?;
    expect(lexer, Token::LBrace)?;

    let mut fields = Vec::new();
    while !lexer.is_next(&Token::RBrace) {
        let mut flags = AccessFlags::empty();
        loop {
            let flag = expect_id(lexer)?;
            flags |= match flag.as_str() {
                "public" => AccessFlags::PUBLIC,
                "private" => AccessFlags::PRIVATE,
                "final" => AccessFlags::FINAL,
                "static" => AccessFlags::STATIC,
                _ => return unexpected("Unknown field flag is specified"),
            };

            if !lexer.is_next_id() {
                break;
            }
        }

        let descriptor = expect_str(lexer)?;
        expect(lexer, Token::Colon)?;
        let name = expect_str(lexer)?;

        if !find_string_in_pool(pool, &descriptor) {
            return unexpected("Unable to find field descriptor in the constant pool");
        }
        if !find_string_in_pool(pool, &name) {
            return unexpected("Unable to find field name in the constant pool");
        }

        fields.push(Field::new(flags, name, descriptor)?);
    }

    expect(lexer, Token::RBrace)?;
    Ok(fields)
}

fn parse_method(lexer: &mut Lexer, pool: &ConstantPool) -> Result<Method, ParserError> {
    expect_keyword(lexer, "method")?;

    let name = expect_str(lexer)?;
    if !find_string_in_pool(pool, &name) {
        return unexpected("Method name was not found in constant pool");
    }

    let descriptor = expect_str(lexer)?;
    if !find_string_in_pool(pool, &descriptor) {
        return unexpected("Method descriptor was not found in constant pool");
    }

    expect(lexer, Token::LBrace)?;

    expect_id_exact(lexer, "Flags")?;
    expect(lexer, Token::Colon)?;
    let mut flags = AccessFlags::empty();
    loop {
        let flag = expect_id(lexer)?;
        flags |= match flag.as_str() {
            "public" => AccessFlags::PUBLIC,
            "static" => AccessFlags::STATIC,
            _ => return unexpected("Unrecognized method access flag"),
        };
        if !lexer.eat(&Token::Comma) {
            break;
        }
    }

    expect_id_exact(lexer, "MaxStack")?;
    expect(lexer, Token::Colon)?;
    let max_stack = expect_num(lexer)? as u16;

    expect_id_exact(lexer, "MaxLocals")?;
    expect(lexer, Token::Colon)?;
    let max_locals = expect_num(lexer)? as u16;

    let code = parse_bytecode(lexer)?;

    expect(lexer, Token::RBrace)?;

    Ok(Method {
        access: flags,
        name,
        descriptor,
        max_stack,
        max_locals,
        code,
        stack_map: None,
    })
}

fn parse_bytecode(lexer: &mut Lexer) -> Result<BciMap<Instruction>, ParserError> {
    expect_keyword(lexer, "bytecode")?;
    expect(lexer, Token::LBrace)?;

    // Labels can be referenced before their definition, so instructions are
    // gathered first and constructed once every label has a bci.
    struct ParsedInst {
        name: String,
        operand: Option<u16>,
        label: Option<String>,
        bci: BciType,
    }

    let mut instructions: Vec<ParsedInst> = Vec::new();
    let mut label_to_bci: HashMap<String, BciType> = HashMap::new();
    let mut current_bci: BciType = 0;

    while !lexer.is_next(&Token::RBrace) {
        // ":<label>" definition
        if lexer.eat(&Token::Colon) {
            let label = expect_id(lexer)?;
            label_to_bci.insert(label, current_bci);
        }

        let name = expect_id(lexer)?;

        let operand = try_parse_cp_index(lexer)?;

        let mut label = None;
        if lexer.eat(&Token::At) {
            label = Some(expect_id(lexer)?);
        }

        // Probe the mnemonic once to learn the instruction length
        let probe = Instruction::from_mnemonic(&name, 0)
            .map_err(|_| ParserError::UnknownInstruction(name.clone()))?;

        instructions.push(ParsedInst {
            name,
            operand,
            label,
            bci: current_bci,
        });
        current_bci += probe.length();
    }
    expect(lexer, Token::RBrace)?;

    let mut code = BciMap::new();
    for parsed in instructions {
        let operand = match &parsed.label {
            Some(label) => {
                let target = *label_to_bci
                    .get(label)
                    .ok_or_else(|| ParserError::UndefinedLabel(label.clone()))?;
                // Branch operands are deltas from the branch instruction
                let offset = target as i64 - parsed.bci as i64;
                (offset as i16) as u16
            }
            None => parsed.operand.unwrap_or(0),
        };

        let instruction = Instruction::from_mnemonic(&parsed.name, operand)
            .map_err(|_| ParserError::UnknownInstruction(parsed.name.clone()))?;
        code.insert(parsed.bci, instruction);
    }

    Ok(code)
}
