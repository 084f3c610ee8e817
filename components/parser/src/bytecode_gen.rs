//! Bytecode generation from the AST.
//!
//! A single pass over the tree emits opcodes into a growing byte buffer
//! per function. Forward jumps are patched once their targets are known;
//! switch jump tables are built in reserved constant-table slots; break
//! and continue lower to GOTO instructions carrying the number of scopes
//! to close.

use std::mem;
use std::rc::Rc;

use bytecode_system::{ConstTable, DebugMap, OpCode, Program};
use core_types::{Chunk, CompileError, Function, Value};

use crate::ast::*;
use crate::parser::Parser;

/// Compiles source text into a program.
pub fn compile(source: &str) -> Result<Program, CompileError> {
    let ast = Parser::new(source)?.parse_program()?;
    let mut consts = ConstTable::new();
    let mut generator = BytecodeGenerator::new(&mut consts);
    let chunk = generator.compile_main(&ast.body)?;
    let main = Function::new_script("main", vec!["__argv__".to_string()], Rc::new(chunk), false);
    Ok(Program {
        constants: Rc::new(consts),
        main,
        debug: Some(DebugMap::from_source(source)),
    })
}

/// Break/continue context kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlKind {
    Loop,
    Switch,
}

/// One enclosing loop or switch, with its pending GOTO patch lists
struct ControlContext {
    kind: ControlKind,
    scope_depth: usize,
    try_depth: usize,
    break_gotos: Vec<usize>,
    continue_gotos: Vec<usize>,
}

/// One active protected region; break and continue must balance its TRY
/// and run its finally body when they jump out of it
#[derive(Clone)]
struct TryContext {
    scope_depth: usize,
    finally: Option<Vec<Statement>>,
}

/// Per-function emission state
struct FunctionState {
    chunk: Chunk,
    scope_depth: usize,
    controls: Vec<ControlContext>,
    try_contexts: Vec<TryContext>,
    line: u32,
}

impl FunctionState {
    fn new() -> FunctionState {
        FunctionState {
            chunk: Chunk::new(),
            scope_depth: 0,
            controls: Vec::new(),
            try_contexts: Vec::new(),
            line: 1,
        }
    }
}

/// Bytecode generator for one compilation unit.
///
/// All functions of the unit share one constant table; nested function
/// literals push a fresh emission state and pop it when their chunk is
/// finished.
pub struct BytecodeGenerator<'a> {
    consts: &'a mut ConstTable,
    func: FunctionState,
    enclosing: Vec<FunctionState>,
}

impl<'a> BytecodeGenerator<'a> {
    /// Creates a generator emitting into `consts`.
    pub fn new(consts: &'a mut ConstTable) -> BytecodeGenerator<'a> {
        BytecodeGenerator {
            consts,
            func: FunctionState::new(),
            enclosing: Vec::new(),
        }
    }

    /// Compiles the main program body.
    ///
    /// The last top-level statement, when it is an expression statement,
    /// leaves its value on the stack so HALT hands it to the host.
    pub fn compile_main(&mut self, body: &[Statement]) -> Result<Chunk, CompileError> {
        for (i, stmt) in body.iter().enumerate() {
            let is_last = i + 1 == body.len();
            if is_last {
                if let Statement::Expression { expression, line } = stmt {
                    self.func.line = *line;
                    self.compile_expression(expression)?;
                    self.emit(OpCode::Halt);
                    return Ok(mem::take(&mut self.func.chunk));
                }
            }
            self.compile_statement(stmt)?;
        }
        self.emit(OpCode::Halt);
        Ok(mem::take(&mut self.func.chunk))
    }

    // ---- emission helpers ----

    fn emit(&mut self, op: OpCode) -> usize {
        let offset = self.func.chunk.code.len();
        self.func.chunk.mark_line(offset, self.func.line);
        self.func.chunk.code.push(u8::from(op));
        offset
    }

    fn emit_u8(&mut self, value: u8) {
        self.func.chunk.code.push(value);
    }

    fn emit_u32(&mut self, value: u32) {
        self.func.chunk.code.extend_from_slice(&value.to_ne_bytes());
    }

    fn emit_i32(&mut self, value: i32) {
        self.func.chunk.code.extend_from_slice(&value.to_ne_bytes());
    }

    fn here(&self) -> usize {
        self.func.chunk.code.len()
    }

    fn name_index(&mut self, name: &str) -> u32 {
        self.consts.add_string(name) as u32
    }

    /// Pushes a literal, using the dedicated short forms where one exists.
    fn emit_const_value(&mut self, value: &Value) {
        match value {
            Value::Undefined => {
                self.emit(OpCode::Stack1);
            }
            Value::Integer(0) => {
                self.emit(OpCode::Const0);
            }
            Value::Integer(1) => {
                self.emit(OpCode::Const1);
            }
            Value::Integer(-1) => {
                self.emit(OpCode::ConstN1);
            }
            other => {
                let idx = self.consts.add(other.clone()) as u32;
                self.emit(OpCode::Const);
                self.emit_u32(idx);
            }
        }
    }

    fn emit_string_const(&mut self, s: &str) {
        let idx = self.name_index(s);
        self.emit(OpCode::Const);
        self.emit_u32(idx);
    }

    fn emit_op_u32(&mut self, op: OpCode, operand: u32) {
        self.emit(op);
        self.emit_u32(operand);
    }

    fn emit_op_i32(&mut self, op: OpCode, operand: i32) {
        self.emit(op);
        self.emit_i32(operand);
    }

    /// Emits a forward jump; returns the operand offset for patching.
    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit(op);
        let operand = self.here();
        self.emit_i32(0);
        operand
    }

    fn patch_jump(&mut self, operand: usize) {
        let rel = self.here() as i64 - (operand as i64 + 4);
        self.func.chunk.code[operand..operand + 4].copy_from_slice(&(rel as i32).to_ne_bytes());
    }

    /// Emits a jump back to an already-emitted target.
    fn emit_jump_back(&mut self, op: OpCode, target: usize) {
        self.emit(op);
        let operand = self.here();
        let rel = target as i64 - (operand as i64 + 4);
        self.emit_i32(rel as i32);
    }

    /// Emits a GOTO with a placeholder absolute target; returns the
    /// operand offset.
    fn emit_goto_placeholder(&mut self, scopes: u8) -> usize {
        self.emit(OpCode::Goto);
        let operand = self.here();
        self.emit_u32(0);
        self.emit_u8(scopes);
        operand
    }

    fn patch_absolute(&mut self, operand: usize, target: usize) {
        self.func.chunk.code[operand..operand + 4]
            .copy_from_slice(&(target as u32).to_ne_bytes());
    }

    fn open_scope(&mut self) {
        self.emit(OpCode::OpenScope);
        self.func.scope_depth += 1;
    }

    fn close_scope(&mut self) {
        self.func.scope_depth -= 1;
        self.emit(OpCode::CloseScope);
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::new(self.func.line, 1, message)
    }

    // ---- statements ----

    fn compile_statements(&mut self, body: &[Statement]) -> Result<(), CompileError> {
        for stmt in body {
            self.compile_statement(stmt)?;
        }
        Ok(())
    }

    fn compile_statement(&mut self, stmt: &Statement) -> Result<(), CompileError> {
        match stmt {
            Statement::Empty => Ok(()),
            Statement::VarDeclaration {
                kind,
                declarations,
                line,
            } => {
                self.func.line = *line;
                for (name, init) in declarations {
                    match init {
                        Some(expr) => self.compile_expression(expr)?,
                        None => {
                            self.emit(OpCode::Stack1);
                        }
                    }
                    let idx = self.name_index(name);
                    let op = match kind {
                        DeclKind::Var => OpCode::DeclVar,
                        DeclKind::Let => OpCode::DeclLet,
                        DeclKind::Const => OpCode::DeclConst,
                    };
                    self.emit_op_u32(op, idx);
                }
                Ok(())
            }
            Statement::FunctionDeclaration { func } => {
                self.func.line = func.line;
                self.compile_function_literal(func)?;
                let idx = self.name_index(&func.name);
                self.emit_op_u32(OpCode::DeclVar, idx);
                Ok(())
            }
            Statement::ClassDeclaration { class } => {
                self.func.line = class.line;
                self.compile_class_literal(class)?;
                let idx = self.name_index(&class.name);
                self.emit_op_u32(OpCode::DeclVar, idx);
                Ok(())
            }
            Statement::Expression { expression, line } => {
                self.func.line = *line;
                self.compile_expression(expression)?;
                self.emit(OpCode::Pop);
                Ok(())
            }
            Statement::Block { body, line } => {
                self.func.line = *line;
                self.open_scope();
                self.compile_statements(body)?;
                self.close_scope();
                Ok(())
            }
            Statement::If {
                test,
                consequent,
                alternate,
                line,
            } => {
                self.func.line = *line;
                self.compile_expression(test)?;
                let to_else = self.emit_jump(OpCode::JmpFalse);
                self.compile_statement(consequent)?;
                match alternate {
                    Some(alt) => {
                        let to_end = self.emit_jump(OpCode::Jmp);
                        self.patch_jump(to_else);
                        self.compile_statement(alt)?;
                        self.patch_jump(to_end);
                    }
                    None => self.patch_jump(to_else),
                }
                Ok(())
            }
            Statement::While { test, body, line } => {
                self.func.line = *line;
                let loop_start = self.here();
                self.push_control(ControlKind::Loop);
                self.compile_expression(test)?;
                let to_exit = self.emit_jump(OpCode::JmpFalse);
                self.compile_statement(body)?;
                self.emit_jump_back(OpCode::Jmp, loop_start);
                self.patch_jump(to_exit);
                let exit = self.here();
                self.finish_control(exit, loop_start);
                Ok(())
            }
            Statement::DoWhile { body, test, line } => {
                self.func.line = *line;
                let body_start = self.here();
                self.push_control(ControlKind::Loop);
                self.compile_statement(body)?;
                let test_start = self.here();
                self.compile_expression(test)?;
                self.emit(OpCode::Not);
                self.emit_jump_back(OpCode::JmpFalse, body_start);
                let exit = self.here();
                self.finish_control(exit, test_start);
                Ok(())
            }
            Statement::For {
                init,
                test,
                update,
                body,
                line,
            } => {
                self.func.line = *line;
                self.open_scope();
                if let Some(init) = init {
                    self.compile_statement(init)?;
                }
                let loop_start = self.here();
                self.push_control(ControlKind::Loop);
                let to_exit = match test {
                    Some(test) => {
                        self.compile_expression(test)?;
                        Some(self.emit_jump(OpCode::JmpFalse))
                    }
                    None => None,
                };
                self.compile_statement(body)?;
                let continue_target = self.here();
                if let Some(update) = update {
                    self.compile_expression(update)?;
                    self.emit(OpCode::Pop);
                }
                self.emit_jump_back(OpCode::Jmp, loop_start);
                if let Some(to_exit) = to_exit {
                    self.patch_jump(to_exit);
                }
                let exit = self.here();
                self.finish_control(exit, continue_target);
                self.close_scope();
                Ok(())
            }
            Statement::ForIn {
                decl,
                name,
                object,
                body,
                line,
            } => self.compile_iteration(*decl, name, object, body, *line, "key"),
            Statement::ForOf {
                decl,
                name,
                iterable,
                body,
                line,
            } => self.compile_iteration(*decl, name, iterable, body, *line, "value"),
            Statement::Break { line } => {
                self.func.line = *line;
                let Some(idx) = self.innermost_control(None) else {
                    return Err(self.error("break outside of loop or switch"));
                };
                let operand = self.compile_early_exit(idx)?;
                self.func.controls[idx].break_gotos.push(operand);
                Ok(())
            }
            Statement::Continue { line } => {
                self.func.line = *line;
                let Some(idx) = self.innermost_control(Some(ControlKind::Loop)) else {
                    return Err(self.error("continue outside of loop"));
                };
                let operand = self.compile_early_exit(idx)?;
                self.func.controls[idx].continue_gotos.push(operand);
                Ok(())
            }
            Statement::Return { argument, line } => {
                self.func.line = *line;
                match argument {
                    Some(expr) => self.compile_expression(expr)?,
                    None => {
                        self.emit(OpCode::Stack1);
                    }
                }
                self.emit(OpCode::Return);
                Ok(())
            }
            Statement::Switch {
                scrutinee,
                cases,
                line,
            } => self.compile_switch(scrutinee, cases, *line),
            Statement::Try {
                block,
                catch,
                finally,
                line,
            } => self.compile_try(block, catch.as_ref(), finally.as_ref(), *line),
            Statement::Throw { argument, line } => {
                self.func.line = *line;
                self.compile_expression(argument)?;
                self.emit(OpCode::Throw);
                Ok(())
            }
        }
    }

    /// Shared lowering for for-in (binds `key`) and for-of (binds
    /// `value`): evaluate the iterable, take its next-function, and loop
    /// until the iteration result reports done.
    fn compile_iteration(
        &mut self,
        decl: Option<DeclKind>,
        name: &str,
        iterable: &Expression,
        body: &Statement,
        line: u32,
        bound_field: &str,
    ) -> Result<(), CompileError> {
        self.func.line = line;
        self.compile_expression(iterable)?;
        self.emit(OpCode::Iter);

        // stack at loop start: [nextfn]
        let loop_start = self.here();
        self.push_control(ControlKind::Loop);
        self.emit(OpCode::Stack1); // this for the call
        self.emit_op_i32(OpCode::Push, -2); // the next-function
        self.emit_op_u32(OpCode::Call, 0); // [nextfn, result]
        self.emit_op_i32(OpCode::Push, -1);
        self.emit_string_const("done");
        self.emit(OpCode::ObjGet); // [nextfn, result, done]
        self.emit(OpCode::Not);
        let to_exit = self.emit_jump(OpCode::JmpFalse);

        self.open_scope();
        self.emit_string_const(bound_field);
        self.emit(OpCode::ObjGet); // [nextfn, bound]
        let idx = self.name_index(name);
        match decl {
            Some(DeclKind::Var) => self.emit_op_u32(OpCode::DeclVar, idx),
            Some(DeclKind::Let) => self.emit_op_u32(OpCode::DeclLet, idx),
            Some(DeclKind::Const) => self.emit_op_u32(OpCode::DeclConst, idx),
            None => self.emit_op_u32(OpCode::SetVar, idx),
        }
        self.compile_statement(body)?;
        self.close_scope();
        self.emit_jump_back(OpCode::Jmp, loop_start);

        // Normal exit: [nextfn, result]
        self.patch_jump(to_exit);
        self.emit_op_u32(OpCode::PopN, 2);
        let to_end = self.emit_jump(OpCode::Jmp);
        // Break target: [nextfn]
        let break_target = self.here();
        self.emit(OpCode::Pop);
        self.patch_jump(to_end);

        // Breaks land before the next-function pop, continues re-enter
        // the loop head
        let ctx = self.func.controls.pop().expect("control context");
        for operand in ctx.break_gotos {
            self.patch_absolute(operand, break_target);
        }
        for operand in ctx.continue_gotos {
            self.patch_absolute(operand, loop_start);
        }
        Ok(())
    }

    fn compile_switch(
        &mut self,
        scrutinee: &Expression,
        cases: &[SwitchCase],
        line: u32,
    ) -> Result<(), CompileError> {
        self.func.line = line;
        self.open_scope();
        self.compile_expression(scrutinee)?;

        // Reserve a constant slot for the jump table; filled below once
        // the case offsets are known
        let table_idx = self.consts.add(Value::array(Vec::new()));
        self.emit_op_u32(OpCode::Const, table_idx as u32);
        self.emit(OpCode::Switch);
        let default_operand = self.here();
        self.emit_u32(0);

        self.push_control(ControlKind::Switch);
        let mut table = Vec::new();
        let mut default_offset = None;
        for case in cases {
            let offset = self.here();
            match &case.test {
                Some(test) => {
                    let value = self.constant_case_value(test)?;
                    table.push(Value::array(vec![value, Value::Integer(offset as i64)]));
                }
                None => default_offset = Some(offset),
            }
            self.compile_statements(&case.body)?;
        }
        let end = self.here();
        self.patch_absolute(default_operand, default_offset.unwrap_or(end));
        self.consts.replace(table_idx, Value::array(table));

        let ctx = self.func.controls.pop().expect("control context");
        for operand in ctx.break_gotos {
            self.patch_absolute(operand, end);
        }
        debug_assert!(ctx.continue_gotos.is_empty());
        self.close_scope();
        Ok(())
    }

    /// Case values must be compile-time constants for the jump-table
    /// dispatch.
    fn constant_case_value(&self, expr: &Expression) -> Result<Value, CompileError> {
        match expr {
            Expression::Literal(v) => Ok(v.clone()),
            Expression::Unary {
                op: UnaryOp::Negate,
                operand,
            } => match operand.as_ref() {
                Expression::Literal(Value::Integer(n)) => Ok(Value::Integer(-n)),
                Expression::Literal(Value::Double(d)) => Ok(Value::Double(-d)),
                _ => Err(self.error("switch case value must be a constant")),
            },
            _ => Err(self.error("switch case value must be a constant")),
        }
    }

    fn compile_try(
        &mut self,
        block: &[Statement],
        catch: Option<&(String, Vec<Statement>)>,
        finally: Option<&Vec<Statement>>,
        line: u32,
    ) -> Result<(), CompileError> {
        self.func.line = line;
        self.emit(OpCode::Try);
        let catch_operand = self.here();
        self.emit_u32(0);

        // Active for the protected block only: the handler and finally
        // bodies run with the TRY already popped
        self.func.try_contexts.push(TryContext {
            scope_depth: self.func.scope_depth,
            finally: finally.cloned(),
        });
        self.open_scope();
        self.compile_statements(block)?;
        self.close_scope();
        self.emit(OpCode::EndTry);
        self.func.try_contexts.pop();
        let to_finally = self.emit_goto_placeholder(0);

        // Unwinder target: with a catch clause, the handler; otherwise
        // the finally body itself, entered with the exception in flight
        let catch_target = self.here();
        self.patch_absolute(catch_operand, catch_target);
        if let Some((param, body)) = catch {
            self.open_scope();
            self.emit(OpCode::LoadExc);
            let idx = self.name_index(param);
            self.emit_op_u32(OpCode::DeclLet, idx);
            self.compile_statements(body)?;
            self.close_scope();
        }

        let finally_target = self.here();
        self.patch_absolute(to_finally, finally_target);
        if let Some(body) = finally {
            self.open_scope();
            self.compile_statements(body)?;
            self.close_scope();
        }
        if catch.is_none() {
            // Pure try/finally: re-enter the unwinder if an exception is
            // still in flight
            self.emit(OpCode::Rethrow);
        }
        Ok(())
    }

    fn push_control(&mut self, kind: ControlKind) {
        self.func.controls.push(ControlContext {
            kind,
            scope_depth: self.func.scope_depth,
            try_depth: self.func.try_contexts.len(),
            break_gotos: Vec::new(),
            continue_gotos: Vec::new(),
        });
    }

    /// Emits the unwind sequence for a break or continue targeting
    /// `control`, returning the GOTO operand offset for patching.
    ///
    /// Every protected region entered since the target control is
    /// balanced on the way out: scopes opened inside it close, its TRY
    /// is matched by an ENDTRY, and its finally body runs. The closing
    /// GOTO then pops the scopes that remain between the outermost
    /// unwound try and the control context. Try-data and scope depth are
    /// therefore balanced on this exit path exactly as on normal ones.
    fn compile_early_exit(&mut self, control: usize) -> Result<usize, CompileError> {
        let saved_depth = self.func.scope_depth;
        let target_try_depth = self.func.controls[control].try_depth;
        let target_scope_depth = self.func.controls[control].scope_depth;

        let tail: Vec<TryContext> = self.func.try_contexts.split_off(target_try_depth);
        for (i, tryctx) in tail.iter().enumerate().rev() {
            while self.func.scope_depth > tryctx.scope_depth {
                self.close_scope();
            }
            self.emit(OpCode::EndTry);
            if let Some(body) = &tryctx.finally {
                // Regions outside this one are still active while its
                // finally body runs; a break in the body unwinds them too
                self.func.try_contexts.extend_from_slice(&tail[..i]);
                self.open_scope();
                let compiled = self.compile_statements(body);
                self.close_scope();
                self.func.try_contexts.truncate(target_try_depth);
                compiled?;
            }
        }
        self.func.try_contexts.extend(tail);

        let scopes = (self.func.scope_depth - target_scope_depth) as u8;
        let operand = self.emit_goto_placeholder(scopes);
        self.func.scope_depth = saved_depth;
        Ok(operand)
    }

    fn finish_control(&mut self, break_target: usize, continue_target: usize) {
        let ctx = self.func.controls.pop().expect("control context");
        for operand in ctx.break_gotos {
            self.patch_absolute(operand, break_target);
        }
        for operand in ctx.continue_gotos {
            self.patch_absolute(operand, continue_target);
        }
    }

    fn innermost_control(&self, want: Option<ControlKind>) -> Option<usize> {
        self.func
            .controls
            .iter()
            .rposition(|c| want.map_or(true, |k| c.kind == k))
    }

    // ---- expressions ----

    fn compile_expression(&mut self, expr: &Expression) -> Result<(), CompileError> {
        match expr {
            Expression::Literal(value) => {
                self.emit_const_value(value);
                Ok(())
            }
            Expression::Template(parts) => self.compile_template(parts),
            Expression::Regex { pattern, flags } => {
                // Instantiated at runtime by the RegExp constructor
                let idx = self.name_index("RegExp");
                self.emit_op_u32(OpCode::GetVar, idx);
                self.emit_string_const(pattern);
                self.emit_string_const(flags);
                self.emit_op_u32(OpCode::New, 2);
                Ok(())
            }
            Expression::Identifier(name) => {
                let idx = self.name_index(name);
                self.emit_op_u32(OpCode::GetVar, idx);
                Ok(())
            }
            Expression::ArrayLiteral(elements) => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                self.emit_op_u32(OpCode::Array, elements.len() as u32);
                Ok(())
            }
            Expression::ObjectLiteral(entries) => self.compile_object_literal(entries),
            Expression::Function(lit) => {
                self.compile_function_literal(lit)?;
                Ok(())
            }
            Expression::Class(lit) => self.compile_class_literal(lit),
            Expression::Unary { op, operand } => {
                self.compile_expression(operand)?;
                match op {
                    UnaryOp::Negate => {
                        self.emit(OpCode::Negate);
                    }
                    UnaryOp::Not => {
                        self.emit(OpCode::Not);
                    }
                    UnaryOp::BitNot => {
                        self.emit(OpCode::BitNot);
                    }
                    UnaryOp::TypeOf => {
                        self.emit(OpCode::TypeOf);
                    }
                    UnaryOp::Plus => {
                        // Numeric coercion: multiply by one
                        self.emit(OpCode::Const1);
                        self.emit(OpCode::Mul);
                    }
                }
                Ok(())
            }
            Expression::Delete { target } => {
                match target.as_ref() {
                    Expression::Member { object, property } => {
                        self.compile_expression(object)?;
                        self.emit_string_const(property);
                    }
                    Expression::Index { object, index } => {
                        self.compile_expression(object)?;
                        self.compile_expression(index)?;
                    }
                    _ => return Err(self.error("delete requires a member expression")),
                }
                self.emit(OpCode::Del);
                Ok(())
            }
            Expression::Update {
                increment,
                prefix,
                target,
            } => {
                self.compile_prefix_update(*increment, target)?;
                if !prefix {
                    // The postfix result is the pre-update value
                    self.emit(OpCode::Const1);
                    self.emit(if *increment { OpCode::Sub } else { OpCode::Add });
                }
                Ok(())
            }
            Expression::Binary { op, left, right } => {
                self.compile_expression(left)?;
                self.compile_expression(right)?;
                match op {
                    BinaryOp::Add => self.emit(OpCode::Add),
                    BinaryOp::Sub => self.emit(OpCode::Sub),
                    BinaryOp::Mul => self.emit(OpCode::Mul),
                    BinaryOp::Div => self.emit(OpCode::Div),
                    BinaryOp::Mod => self.emit(OpCode::Mod),
                    BinaryOp::Pow => self.emit(OpCode::Pow),
                    BinaryOp::Equals => self.emit(OpCode::Equals),
                    BinaryOp::NotEquals => self.emit(OpCode::NEquals),
                    BinaryOp::StrictEquals => self.emit(OpCode::StrEquals),
                    BinaryOp::StrictNotEquals => {
                        self.emit(OpCode::StrEquals);
                        self.emit(OpCode::Not)
                    }
                    BinaryOp::Lt => self.emit(OpCode::Lt),
                    BinaryOp::Le => self.emit(OpCode::Le),
                    BinaryOp::Gt => self.emit(OpCode::Gt),
                    BinaryOp::Ge => self.emit(OpCode::Ge),
                    BinaryOp::BitAnd => self.emit(OpCode::BitAnd),
                    BinaryOp::BitOr => self.emit(OpCode::BitOr),
                    BinaryOp::BitXor => self.emit(OpCode::BitXor),
                    BinaryOp::Shl => self.emit(OpCode::BitLsh),
                    BinaryOp::Shr => self.emit(OpCode::BitRsh),
                    BinaryOp::UShr => self.emit(OpCode::BitURsh),
                    BinaryOp::InstanceOf => self.emit(OpCode::InstanceOf),
                };
                Ok(())
            }
            Expression::Logical { op, left, right } => {
                self.compile_expression(left)?;
                let to_end = self.emit_logical_short_circuit(*op);
                self.emit(OpCode::Pop);
                self.compile_expression(right)?;
                self.patch_jump(to_end);
                Ok(())
            }
            Expression::Ternary {
                test,
                consequent,
                alternate,
            } => {
                self.compile_expression(test)?;
                let to_else = self.emit_jump(OpCode::JmpFalse);
                self.compile_expression(consequent)?;
                let to_end = self.emit_jump(OpCode::Jmp);
                self.patch_jump(to_else);
                self.compile_expression(alternate)?;
                self.patch_jump(to_end);
                Ok(())
            }
            Expression::Assignment { op, target, value } => {
                self.compile_assignment(*op, target, value)
            }
            Expression::ArrayDestructure { targets, value } => {
                self.compile_destructure(targets, value, true)
            }
            Expression::ObjectDestructure { targets, value } => {
                self.compile_destructure(targets, value, false)
            }
            Expression::Member { object, property } => {
                self.compile_expression(object)?;
                self.emit_string_const(property);
                self.emit(OpCode::ObjGet);
                Ok(())
            }
            Expression::Index { object, index } => {
                self.compile_expression(object)?;
                self.compile_expression(index)?;
                self.emit(OpCode::ObjGet);
                Ok(())
            }
            Expression::Call { callee, args } => self.compile_call(callee, args),
            Expression::New { callee, args } => {
                self.compile_expression(callee)?;
                for arg in args {
                    self.compile_expression(arg)?;
                }
                self.emit_op_u32(OpCode::New, args.len() as u32);
                Ok(())
            }
            Expression::This => {
                self.emit(OpCode::This);
                Ok(())
            }
            Expression::SuperCall(args) => {
                // The base constructor runs against the current `this`
                self.emit(OpCode::This);
                let idx = self.name_index("super");
                self.emit_op_u32(OpCode::GetVar, idx);
                for arg in args {
                    self.compile_expression(arg)?;
                }
                self.emit_op_u32(OpCode::Call, args.len() as u32);
                Ok(())
            }
            Expression::SuperMember(property) => {
                self.compile_super_member(property);
                Ok(())
            }
            Expression::Yield(argument) => {
                // An ordinary call through the `yield` binding installed
                // by the generator machinery
                self.emit(OpCode::Stack1);
                let idx = self.name_index("yield");
                self.emit_op_u32(OpCode::GetVar, idx);
                match argument {
                    Some(expr) => self.compile_expression(expr)?,
                    None => {
                        self.emit(OpCode::Stack1);
                    }
                }
                self.emit_op_u32(OpCode::Call, 1);
                Ok(())
            }
        }
    }

    /// Emits the test-and-skip sequence for `&&`, `||` and `??` with the
    /// left operand on the stack; returns the jump operand to patch at
    /// the merge point. The left operand is left on the stack when it is
    /// selected.
    fn emit_logical_short_circuit(&mut self, op: LogicalOp) -> usize {
        match op {
            LogicalOp::And => {
                self.emit_op_i32(OpCode::Push, -1);
                self.emit_jump(OpCode::JmpFalse)
            }
            LogicalOp::Or => {
                self.emit_op_i32(OpCode::Push, -1);
                self.emit(OpCode::Not);
                self.emit_jump(OpCode::JmpFalse)
            }
            LogicalOp::Nullish => {
                // nullish iff strictly equal to undefined or to null
                self.emit_op_i32(OpCode::Push, -1);
                self.emit(OpCode::Stack1);
                self.emit(OpCode::StrEquals);
                self.emit_op_i32(OpCode::Push, -2);
                let null_idx = self.consts.add(Value::Null) as u32;
                self.emit_op_u32(OpCode::Const, null_idx);
                self.emit(OpCode::StrEquals);
                self.emit(OpCode::Or);
                self.emit_jump(OpCode::JmpFalse)
            }
        }
    }

    fn compile_template(&mut self, parts: &[TemplateElement]) -> Result<(), CompileError> {
        if parts.is_empty() {
            self.emit_string_const("");
            return Ok(());
        }
        for part in parts {
            match part {
                TemplateElement::Text(text) => self.emit_string_const(text),
                TemplateElement::Expr(expr) => self.compile_expression(expr)?,
            }
        }
        self.emit_op_u32(OpCode::Concat, parts.len() as u32);
        Ok(())
    }

    fn compile_object_literal(&mut self, entries: &[ObjectEntry]) -> Result<(), CompileError> {
        let mut field_count = 0u32;
        for entry in entries {
            if let ObjectEntry::Field { key, value } = entry {
                self.emit_string_const(key);
                self.compile_expression(value)?;
                field_count += 1;
            }
        }
        self.emit_op_u32(OpCode::Object, field_count);

        // Accessors attach through the Object statics, keeping the
        // freshly built object on the stack
        for entry in entries {
            let (static_name, key, func) = match entry {
                ObjectEntry::Getter { key, func } => ("setGetter", key, func),
                ObjectEntry::Setter { key, func } => ("setSetter", key, func),
                ObjectEntry::Field { .. } => continue,
            };
            self.emit(OpCode::Stack1);
            let object_idx = self.name_index("Object");
            self.emit_op_u32(OpCode::GetVar, object_idx);
            self.emit_string_const(static_name);
            self.emit(OpCode::ObjGet);
            self.emit_op_i32(OpCode::Push, -3);
            self.emit_string_const(key);
            self.compile_function_literal(func)?;
            self.emit_op_u32(OpCode::Call, 3);
            self.emit(OpCode::Pop);
        }
        Ok(())
    }

    /// Compiles a nested function body and pushes the resulting template
    /// through CONST (which rebinds it to the runtime environment).
    fn compile_function_literal(&mut self, lit: &FunctionLiteral) -> Result<(), CompileError> {
        self.enclosing.push(mem::replace(&mut self.func, FunctionState::new()));
        self.func.line = lit.line;

        let result = self.compile_statements(&lit.body);
        self.emit(OpCode::Stack1);
        self.emit(OpCode::Return);

        let finished = mem::replace(
            &mut self.func,
            self.enclosing.pop().expect("enclosing function state"),
        );
        result?;

        let template = Function::new_script(
            lit.name.clone(),
            lit.params.clone(),
            Rc::new(finished.chunk),
            lit.is_generator,
        );
        let idx = self.consts.add(Value::Function(template)) as u32;
        self.emit_op_u32(OpCode::Const, idx);
        Ok(())
    }

    /// Compiles a class literal, leaving the constructor on the stack.
    fn compile_class_literal(&mut self, lit: &ClassLiteral) -> Result<(), CompileError> {
        self.func.line = lit.line;

        // Constructor: explicit, or a synthesized default that forwards
        // to the base class when one exists
        let default_ctor;
        let ctor = match &lit.constructor {
            Some(ctor) => ctor,
            None => {
                let body = if lit.super_class.is_some() {
                    vec![Statement::Expression {
                        expression: Expression::SuperCall(Vec::new()),
                        line: lit.line,
                    }]
                } else {
                    Vec::new()
                };
                default_ctor = FunctionLiteral {
                    name: lit.name.clone(),
                    params: Vec::new(),
                    body,
                    is_generator: false,
                    line: lit.line,
                };
                &default_ctor
            }
        };
        self.compile_function_literal(ctor)?;

        let mut methods = Vec::new();
        let mut getters = Vec::new();
        let mut setters = Vec::new();
        let mut statics = Vec::new();
        for member in &lit.members {
            match member {
                ClassMember::Method { name, func } => methods.push((name, func)),
                ClassMember::Getter { name, func } => getters.push((name, func)),
                ClassMember::Setter { name, func } => setters.push((name, func)),
                ClassMember::Static { name, func } => statics.push((name, func)),
            }
        }
        for group in [&methods, &getters, &setters, &statics] {
            if group.len() > u8::MAX as usize {
                return Err(self.error("class has too many members"));
            }
            for (name, func) in group.iter() {
                self.emit_string_const(name);
                self.compile_function_literal(func)?;
            }
        }

        match &lit.super_class {
            Some(base) => self.compile_expression(base)?,
            None => {
                self.emit(OpCode::Stack1);
            }
        }

        self.emit(OpCode::Class);
        self.emit_u8(methods.len() as u8);
        self.emit_u8(getters.len() as u8);
        self.emit_u8(setters.len() as u8);
        self.emit_u8(statics.len() as u8);
        Ok(())
    }

    fn compile_super_member(&mut self, property: &str) {
        let idx = self.name_index("super");
        self.emit_op_u32(OpCode::GetVar, idx);
        self.emit_string_const("prototype");
        self.emit(OpCode::ObjGet);
        self.emit_string_const(property);
        self.emit(OpCode::ObjGet);
    }

    fn compile_call(
        &mut self,
        callee: &Expression,
        args: &[Expression],
    ) -> Result<(), CompileError> {
        match callee {
            Expression::Member { object, property } => {
                self.compile_expression(object)?;
                self.emit_op_i32(OpCode::Push, -1);
                self.emit_string_const(property);
                self.emit(OpCode::ObjGet);
            }
            Expression::Index { object, index } => {
                self.compile_expression(object)?;
                self.emit_op_i32(OpCode::Push, -1);
                self.compile_expression(index)?;
                self.emit(OpCode::ObjGet);
            }
            Expression::SuperMember(property) => {
                // `super.m(...)` runs the base method against this
                self.emit(OpCode::This);
                self.compile_super_member(property);
            }
            other => {
                self.emit(OpCode::Stack1);
                self.compile_expression(other)?;
            }
        }
        for arg in args {
            self.compile_expression(arg)?;
        }
        self.emit_op_u32(OpCode::Call, args.len() as u32);
        Ok(())
    }

    fn compile_assignment(
        &mut self,
        op: AssignOp,
        target: &Expression,
        value: &Expression,
    ) -> Result<(), CompileError> {
        match (op, target) {
            (AssignOp::Assign, Expression::Identifier(name)) => {
                self.compile_expression(value)?;
                self.emit_op_i32(OpCode::Push, -1);
                let idx = self.name_index(name);
                self.emit_op_u32(OpCode::SetVar, idx);
                Ok(())
            }
            (AssignOp::Compound(bin), Expression::Identifier(name)) => {
                let idx = self.name_index(name);
                self.emit_op_u32(OpCode::GetVar, idx);
                self.compile_expression(value)?;
                self.emit_binary_op(bin);
                self.emit_op_i32(OpCode::Push, -1);
                self.emit_op_u32(OpCode::SetVar, idx);
                Ok(())
            }
            (AssignOp::Logical(logical), Expression::Identifier(name)) => {
                let idx = self.name_index(name);
                self.emit_op_u32(OpCode::GetVar, idx);
                let to_end = self.emit_logical_short_circuit(logical);
                self.emit(OpCode::Pop);
                self.compile_expression(value)?;
                self.emit_op_i32(OpCode::Push, -1);
                self.emit_op_u32(OpCode::SetVar, idx);
                self.patch_jump(to_end);
                Ok(())
            }
            (AssignOp::Assign, Expression::Member { .. } | Expression::Index { .. }) => {
                self.compile_member_target(target)?;
                self.compile_expression(value)?;
                self.emit(OpCode::ObjSet);
                Ok(())
            }
            (AssignOp::Compound(bin), Expression::Member { .. } | Expression::Index { .. }) => {
                // Evaluate the target once, read, combine, write back
                self.compile_member_target(target)?;
                self.emit_op_i32(OpCode::Push, -2);
                self.emit_op_i32(OpCode::Push, -2);
                self.emit(OpCode::ObjGet);
                self.compile_expression(value)?;
                self.emit_binary_op(bin);
                self.emit(OpCode::ObjSet);
                Ok(())
            }
            (AssignOp::Logical(logical), Expression::Member { .. } | Expression::Index { .. }) => {
                // Lowered to `target <op> (target = value)`
                let lowered = Expression::Logical {
                    op: logical,
                    left: Box::new(target.clone()),
                    right: Box::new(Expression::Assignment {
                        op: AssignOp::Assign,
                        target: Box::new(target.clone()),
                        value: Box::new(value.clone()),
                    }),
                };
                self.compile_expression(&lowered)
            }
            _ => Err(self.error("invalid assignment target")),
        }
    }

    /// Pushes object then key for a member or index target.
    fn compile_member_target(&mut self, target: &Expression) -> Result<(), CompileError> {
        match target {
            Expression::Member { object, property } => {
                self.compile_expression(object)?;
                self.emit_string_const(property);
                Ok(())
            }
            Expression::Index { object, index } => {
                self.compile_expression(object)?;
                self.compile_expression(index)?;
                Ok(())
            }
            _ => Err(self.error("invalid assignment target")),
        }
    }

    fn emit_binary_op(&mut self, op: BinaryOp) {
        match op {
            BinaryOp::Add => self.emit(OpCode::Add),
            BinaryOp::Sub => self.emit(OpCode::Sub),
            BinaryOp::Mul => self.emit(OpCode::Mul),
            BinaryOp::Div => self.emit(OpCode::Div),
            BinaryOp::Mod => self.emit(OpCode::Mod),
            BinaryOp::Pow => self.emit(OpCode::Pow),
            BinaryOp::BitAnd => self.emit(OpCode::BitAnd),
            BinaryOp::BitOr => self.emit(OpCode::BitOr),
            BinaryOp::BitXor => self.emit(OpCode::BitXor),
            BinaryOp::Shl => self.emit(OpCode::BitLsh),
            BinaryOp::Shr => self.emit(OpCode::BitRsh),
            BinaryOp::UShr => self.emit(OpCode::BitURsh),
            BinaryOp::Equals => self.emit(OpCode::Equals),
            BinaryOp::NotEquals => self.emit(OpCode::NEquals),
            BinaryOp::StrictEquals => self.emit(OpCode::StrEquals),
            BinaryOp::Lt => self.emit(OpCode::Lt),
            BinaryOp::Le => self.emit(OpCode::Le),
            BinaryOp::Gt => self.emit(OpCode::Gt),
            BinaryOp::Ge => self.emit(OpCode::Ge),
            BinaryOp::InstanceOf => self.emit(OpCode::InstanceOf),
            BinaryOp::StrictNotEquals => {
                self.emit(OpCode::StrEquals);
                self.emit(OpCode::Not)
            }
        };
    }

    /// Emits the prefix increment/decrement sequence, leaving the new
    /// value on the stack.
    fn compile_prefix_update(
        &mut self,
        increment: bool,
        target: &Expression,
    ) -> Result<(), CompileError> {
        let step = if increment { OpCode::Add } else { OpCode::Sub };
        match target {
            Expression::Identifier(name) => {
                let idx = self.name_index(name);
                self.emit_op_u32(OpCode::GetVar, idx);
                self.emit(OpCode::Const1);
                self.emit(step);
                self.emit_op_i32(OpCode::Push, -1);
                self.emit_op_u32(OpCode::SetVar, idx);
                Ok(())
            }
            Expression::Member { .. } | Expression::Index { .. } => {
                self.compile_member_target(target)?;
                self.emit_op_i32(OpCode::Push, -2);
                self.emit_op_i32(OpCode::Push, -2);
                self.emit(OpCode::ObjGet);
                self.emit(OpCode::Const1);
                self.emit(step);
                self.emit(OpCode::ObjSet);
                Ok(())
            }
            _ => Err(self.error("invalid increment target")),
        }
    }

    /// Destructuring assignment: read each element or field from the
    /// value, apply defaults, and assign to already-declared names. The
    /// destructured value remains as the expression result.
    fn compile_destructure(
        &mut self,
        targets: &[DestructureTarget],
        value: &Expression,
        by_index: bool,
    ) -> Result<(), CompileError> {
        self.compile_expression(value)?;
        for (i, target) in targets.iter().enumerate() {
            self.emit_op_i32(OpCode::Push, -1);
            if by_index {
                self.emit_const_value(&Value::Integer(i as i64));
            } else {
                self.emit_string_const(&target.key);
            }
            self.emit(OpCode::ObjGet);
            if let Some(default) = &target.default {
                self.emit_op_i32(OpCode::Push, -1);
                self.emit(OpCode::Stack1);
                self.emit(OpCode::StrEquals);
                let to_keep = self.emit_jump(OpCode::JmpFalse);
                self.emit(OpCode::Pop);
                self.compile_expression(default)?;
                self.patch_jump(to_keep);
            }
            let idx = self.name_index(&target.name);
            self.emit_op_u32(OpCode::SetVar, idx);
        }
        Ok(())
    }
}
