//! Board representation and move generation
//!
//! Squares are indexed 0..64 with 0 = a8 and 63 = h1, so rank 8 is the first row.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

const KNIGHT_STEPS: [(i8, i8); 8] = [
    (-2, -1),
    (-2, 1),
    (-1, -2),
    (-1, 2),
    (1, -2),
    (1, 2),
    (2, -1),
    (2, 1),
];
const DIAGONALS: [(i8, i8); 4] = [(-1, -1), (-1, 1), (1, -1), (1, 1)];
const LINES: [(i8, i8); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];
const PROMOTIONS: [PieceKind; 4] = [PieceKind::Queen, PieceKind::Rook, PieceKind::Bishop, PieceKind::Knight];

/// Why a move was refused. The position is untouched in every case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MoveError {
    #[error("game is not running")]
    GameNotRunning,
    #[error("game is over")]
    GameOver,
    #[error("not a seated player")]
    NotAPlayer,
    #[error("not your turn")]
    NotYourTurn,
    #[error("bad square")]
    BadSquare,
    #[error("no piece on source square")]
    NoPiece,
    #[error("piece belongs to the opponent")]
    NotYourPiece,
    #[error("illegal move")]
    IllegalMove,
    #[error("move leaves own king in check")]
    LeavesKingInCheck,
    #[error("promotion piece required")]
    PromotionRequired,
    #[error("bad promotion piece")]
    BadPromotion,
}

impl MoveError {
    pub fn reason(&self) -> &'static str {
        match self {
            MoveError::GameNotRunning => "game_not_running",
            MoveError::GameOver => "game_over",
            MoveError::NotAPlayer => "not_a_player",
            MoveError::NotYourTurn => "not_your_turn",
            MoveError::BadSquare => "bad_square",
            MoveError::NoPiece => "no_piece",
            MoveError::NotYourPiece => "not_your_piece",
            MoveError::IllegalMove => "illegal_move",
            MoveError::LeavesKingInCheck => "leaves_king_in_check",
            MoveError::PromotionRequired => "promotion_required",
            MoveError::BadPromotion => "bad_promotion",
        }
    }
}

impl From<MoveError> for CoreError {
    fn from(err: MoveError) -> Self {
        match err {
            MoveError::GameNotRunning | MoveError::GameOver => CoreError::State(err.reason()),
            other => CoreError::Validation(other.reason()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "w")]
    White,
    #[serde(rename = "b")]
    Black,
}

impl Side {
    pub fn opponent(self) -> Side {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }

    fn fen_char(self) -> char {
        match self {
            Side::White => 'w',
            Side::Black => 'b',
        }
    }

    /// Row delta of a forward pawn step
    fn forward(self) -> i8 {
        match self {
            Side::White => -1,
            Side::Black => 1,
        }
    }

    fn pawn_start_row(self) -> u8 {
        match self {
            Side::White => 6,
            Side::Black => 1,
        }
    }

    fn promotion_row(self) -> u8 {
        match self {
            Side::White => 0,
            Side::Black => 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PieceKind {
    Pawn,
    Knight,
    Bishop,
    Rook,
    Queen,
    King,
}

impl PieceKind {
    fn letter(self) -> char {
        match self {
            PieceKind::Pawn => 'p',
            PieceKind::Knight => 'n',
            PieceKind::Bishop => 'b',
            PieceKind::Rook => 'r',
            PieceKind::Queen => 'q',
            PieceKind::King => 'k',
        }
    }

    /// Parse a promotion choice (`q`, `r`, `b`, `n`)
    pub fn promotion(s: &str) -> Result<PieceKind, MoveError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "q" => Ok(PieceKind::Queen),
            "r" => Ok(PieceKind::Rook),
            "b" => Ok(PieceKind::Bishop),
            "n" => Ok(PieceKind::Knight),
            _ => Err(MoveError::BadPromotion),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Piece {
    pub side: Side,
    pub kind: PieceKind,
}

impl Piece {
    const fn new(side: Side, kind: PieceKind) -> Self {
        Self { side, kind }
    }

    fn fen_char(self) -> char {
        let c = self.kind.letter();
        match self.side {
            Side::White => c.to_ascii_uppercase(),
            Side::Black => c,
        }
    }
}

/// Board square, 0 = a8
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Square(u8);

impl Square {
    pub fn parse(s: &str) -> Result<Square, MoveError> {
        let bytes = s.trim().as_bytes();
        if bytes.len() != 2 {
            return Err(MoveError::BadSquare);
        }
        let file = bytes[0].to_ascii_lowercase();
        let rank = bytes[1];
        if !(b'a'..=b'h').contains(&file) || !(b'1'..=b'8').contains(&rank) {
            return Err(MoveError::BadSquare);
        }
        let row = 7 - (rank - b'1');
        Ok(Square(row * 8 + (file - b'a')))
    }

    fn at(row: i8, col: i8) -> Option<Square> {
        if (0..8).contains(&row) && (0..8).contains(&col) {
            Some(Square((row * 8 + col) as u8))
        } else {
            None
        }
    }

    pub fn row(self) -> u8 {
        self.0 / 8
    }

    pub fn col(self) -> u8 {
        self.0 % 8
    }

    fn offset(self, dr: i8, dc: i8) -> Option<Square> {
        Square::at(self.row() as i8 + dr, self.col() as i8 + dc)
    }

    fn index(self) -> usize {
        self.0 as usize
    }

    fn is_light(self) -> bool {
        (self.row() + self.col()) % 2 == 0
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let file = (b'a' + self.col()) as char;
        let rank = 8 - self.row();
        write!(f, "{}{}", file, rank)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Castle {
    KingSide,
    QueenSide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Move {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<PieceKind>,
    pub castle: Option<Castle>,
    pub en_passant: bool,
}

impl Move {
    fn plain(from: Square, to: Square) -> Self {
        Self {
            from,
            to,
            promotion: None,
            castle: None,
            en_passant: false,
        }
    }

    pub fn uci(&self) -> String {
        let mut s = format!("{}{}", self.from, self.to);
        if let Some(p) = self.promotion {
            s.push(p.letter());
        }
        s
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CastleRights {
    white_king: bool,
    white_queen: bool,
    black_king: bool,
    black_queen: bool,
}

impl CastleRights {
    fn has(&self, side: Side, castle: Castle) -> bool {
        match (side, castle) {
            (Side::White, Castle::KingSide) => self.white_king,
            (Side::White, Castle::QueenSide) => self.white_queen,
            (Side::Black, Castle::KingSide) => self.black_king,
            (Side::Black, Castle::QueenSide) => self.black_queen,
        }
    }

    /// Any move touching a king or rook home square drops the matching right
    fn touch(&mut self, sq: Square) {
        match sq.to_string().as_str() {
            "e1" => {
                self.white_king = false;
                self.white_queen = false;
            }
            "e8" => {
                self.black_king = false;
                self.black_queen = false;
            }
            "h1" => self.white_king = false,
            "a1" => self.white_queen = false,
            "h8" => self.black_king = false,
            "a8" => self.black_queen = false,
            _ => {}
        }
    }

    fn fen(&self) -> String {
        let mut s = String::new();
        if self.white_king {
            s.push('K');
        }
        if self.white_queen {
            s.push('Q');
        }
        if self.black_king {
            s.push('k');
        }
        if self.black_queen {
            s.push('q');
        }
        if s.is_empty() {
            s.push('-');
        }
        s
    }
}

/// Full chess position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    board: [Option<Piece>; 64],
    turn: Side,
    castling: CastleRights,
    ep: Option<Square>,
    halfmove: u32,
    fullmove: u32,
}

impl Default for Position {
    fn default() -> Self {
        Self::initial()
    }
}

impl Position {
    pub fn initial() -> Self {
        let back = [
            PieceKind::Rook,
            PieceKind::Knight,
            PieceKind::Bishop,
            PieceKind::Queen,
            PieceKind::King,
            PieceKind::Bishop,
            PieceKind::Knight,
            PieceKind::Rook,
        ];
        let mut board = [None; 64];
        for (col, kind) in back.iter().enumerate() {
            board[col] = Some(Piece::new(Side::Black, *kind));
            board[8 + col] = Some(Piece::new(Side::Black, PieceKind::Pawn));
            board[48 + col] = Some(Piece::new(Side::White, PieceKind::Pawn));
            board[56 + col] = Some(Piece::new(Side::White, *kind));
        }
        Self {
            board,
            turn: Side::White,
            castling: CastleRights {
                white_king: true,
                white_queen: true,
                black_king: true,
                black_queen: true,
            },
            ep: None,
            halfmove: 0,
            fullmove: 1,
        }
    }

    /// Empty board with the given pieces. Castling rights are granted only where
    /// king and rook stand on their home squares.
    pub fn from_pieces(pieces: &[(&str, Side, PieceKind)], turn: Side) -> Result<Self, MoveError> {
        let mut board = [None; 64];
        for (sq, side, kind) in pieces {
            board[Square::parse(sq)?.index()] = Some(Piece::new(*side, *kind));
        }
        let at = |s: &str, p: Piece| Square::parse(s).map(|sq| board[sq.index()] == Some(p)).unwrap_or(false);
        let wk = at("e1", Piece::new(Side::White, PieceKind::King));
        let bk = at("e8", Piece::new(Side::Black, PieceKind::King));
        let castling = CastleRights {
            white_king: wk && at("h1", Piece::new(Side::White, PieceKind::Rook)),
            white_queen: wk && at("a1", Piece::new(Side::White, PieceKind::Rook)),
            black_king: bk && at("h8", Piece::new(Side::Black, PieceKind::Rook)),
            black_queen: bk && at("a8", Piece::new(Side::Black, PieceKind::Rook)),
        };
        Ok(Self {
            board,
            turn,
            castling,
            ep: None,
            halfmove: 0,
            fullmove: 1,
        })
    }

    pub fn turn(&self) -> Side {
        self.turn
    }

    pub fn halfmove(&self) -> u32 {
        self.halfmove
    }

    pub fn piece_at(&self, sq: Square) -> Option<Piece> {
        self.board[sq.index()]
    }

    pub fn ep_square(&self) -> Option<Square> {
        self.ep
    }

    pub fn castle_rights(&self) -> String {
        self.castling.fen()
    }

    fn king_square(&self, side: Side) -> Option<Square> {
        self.board
            .iter()
            .position(|p| *p == Some(Piece::new(side, PieceKind::King)))
            .map(|i| Square(i as u8))
    }

    /// Whether `sq` is attacked by any piece of `by`
    pub fn is_attacked(&self, sq: Square, by: Side) -> bool {
        let holds = |s: Option<Square>, kinds: &[PieceKind]| {
            s.and_then(|s| self.piece_at(s))
                .map(|p| p.side == by && kinds.contains(&p.kind))
                .unwrap_or(false)
        };

        // an attacking pawn sits one row behind the target, from its own point of view
        let pawn_row = -by.forward();
        if holds(sq.offset(pawn_row, -1), &[PieceKind::Pawn]) || holds(sq.offset(pawn_row, 1), &[PieceKind::Pawn]) {
            return true;
        }
        if KNIGHT_STEPS
            .iter()
            .any(|&(dr, dc)| holds(sq.offset(dr, dc), &[PieceKind::Knight]))
        {
            return true;
        }
        for dr in -1..=1 {
            for dc in -1..=1 {
                if (dr, dc) != (0, 0) && holds(sq.offset(dr, dc), &[PieceKind::King]) {
                    return true;
                }
            }
        }
        let slides = |dirs: &[(i8, i8)], kinds: &[PieceKind]| {
            dirs.iter().any(|&(dr, dc)| {
                let mut cur = sq.offset(dr, dc);
                while let Some(s) = cur {
                    if let Some(p) = self.piece_at(s) {
                        return p.side == by && kinds.contains(&p.kind);
                    }
                    cur = s.offset(dr, dc);
                }
                false
            })
        };
        slides(&DIAGONALS, &[PieceKind::Bishop, PieceKind::Queen])
            || slides(&LINES, &[PieceKind::Rook, PieceKind::Queen])
    }

    pub fn in_check(&self, side: Side) -> bool {
        self.king_square(side)
            .map(|k| self.is_attacked(k, side.opponent()))
            .unwrap_or(false)
    }

    fn push_slides(&self, from: Square, side: Side, dirs: &[(i8, i8)], moves: &mut Vec<Move>) {
        for &(dr, dc) in dirs {
            let mut cur = from.offset(dr, dc);
            while let Some(to) = cur {
                match self.piece_at(to) {
                    None => moves.push(Move::plain(from, to)),
                    Some(p) => {
                        if p.side != side {
                            moves.push(Move::plain(from, to));
                        }
                        break;
                    }
                }
                cur = to.offset(dr, dc);
            }
        }
    }

    fn push_pawn(&self, from: Square, to: Square, side: Side, moves: &mut Vec<Move>, en_passant: bool) {
        if to.row() == side.promotion_row() {
            for kind in PROMOTIONS {
                moves.push(Move {
                    promotion: Some(kind),
                    ..Move::plain(from, to)
                });
            }
        } else {
            moves.push(Move {
                en_passant,
                ..Move::plain(from, to)
            });
        }
    }

    fn push_castles(&self, from: Square, side: Side, moves: &mut Vec<Move>) {
        let home = match side {
            Side::White => 7,
            Side::Black => 0,
        };
        if from != Square(home * 8 + 4) || self.in_check(side) {
            return;
        }
        let enemy = side.opponent();
        let rook = Some(Piece::new(side, PieceKind::Rook));
        let sq = |col: u8| Square(home * 8 + col);
        let empty = |cols: &[u8]| cols.iter().all(|&c| self.piece_at(sq(c)).is_none());
        let safe = |cols: &[u8]| cols.iter().all(|&c| !self.is_attacked(sq(c), enemy));

        if self.castling.has(side, Castle::KingSide) && self.piece_at(sq(7)) == rook && empty(&[5, 6]) && safe(&[5, 6]) {
            moves.push(Move {
                castle: Some(Castle::KingSide),
                ..Move::plain(from, sq(6))
            });
        }
        if self.castling.has(side, Castle::QueenSide)
            && self.piece_at(sq(0)) == rook
            && empty(&[1, 2, 3])
            && safe(&[2, 3])
        {
            moves.push(Move {
                castle: Some(Castle::QueenSide),
                ..Move::plain(from, sq(2))
            });
        }
    }

    /// Moves obeying piece movement rules, ignoring self-check
    pub fn pseudo_moves_from(&self, from: Square) -> Vec<Move> {
        let mut moves = Vec::new();
        let Some(piece) = self.piece_at(from) else {
            return moves;
        };
        let side = piece.side;
        match piece.kind {
            PieceKind::Pawn => {
                let fwd = side.forward();
                if let Some(one) = from.offset(fwd, 0) {
                    if self.piece_at(one).is_none() {
                        self.push_pawn(from, one, side, &mut moves, false);
                        if from.row() == side.pawn_start_row() {
                            if let Some(two) = from.offset(2 * fwd, 0) {
                                if self.piece_at(two).is_none() {
                                    moves.push(Move::plain(from, two));
                                }
                            }
                        }
                    }
                }
                for dc in [-1, 1] {
                    let Some(to) = from.offset(fwd, dc) else {
                        continue;
                    };
                    match self.piece_at(to) {
                        Some(p) if p.side != side => self.push_pawn(from, to, side, &mut moves, false),
                        None if self.ep == Some(to) => self.push_pawn(from, to, side, &mut moves, true),
                        _ => {}
                    }
                }
            }
            PieceKind::Knight => {
                for (dr, dc) in KNIGHT_STEPS {
                    if let Some(to) = from.offset(dr, dc) {
                        if self.piece_at(to).map(|p| p.side != side).unwrap_or(true) {
                            moves.push(Move::plain(from, to));
                        }
                    }
                }
            }
            PieceKind::Bishop => self.push_slides(from, side, &DIAGONALS, &mut moves),
            PieceKind::Rook => self.push_slides(from, side, &LINES, &mut moves),
            PieceKind::Queen => {
                self.push_slides(from, side, &DIAGONALS, &mut moves);
                self.push_slides(from, side, &LINES, &mut moves);
            }
            PieceKind::King => {
                for dr in -1..=1 {
                    for dc in -1..=1 {
                        if (dr, dc) == (0, 0) {
                            continue;
                        }
                        if let Some(to) = from.offset(dr, dc) {
                            if self.piece_at(to).map(|p| p.side != side).unwrap_or(true) {
                                moves.push(Move::plain(from, to));
                            }
                        }
                    }
                }
                self.push_castles(from, side, &mut moves);
            }
        }
        moves
    }

    /// Whether the mover's king is safe after `mv`
    fn keeps_king_safe(&self, mv: &Move) -> bool {
        let mut next = self.clone();
        next.apply_unchecked(mv);
        !next.in_check(self.turn)
    }

    /// Every legal move for the side to move
    pub fn legal_moves(&self) -> Vec<Move> {
        (0..64u8)
            .map(Square)
            .filter(|&sq| self.piece_at(sq).map(|p| p.side == self.turn).unwrap_or(false))
            .flat_map(|sq| self.pseudo_moves_from(sq))
            .filter(|mv| self.keeps_king_safe(mv))
            .collect()
    }

    pub fn has_legal_move(&self) -> bool {
        (0..64u8)
            .map(Square)
            .filter(|&sq| self.piece_at(sq).map(|p| p.side == self.turn).unwrap_or(false))
            .any(|sq| self.pseudo_moves_from(sq).iter().any(|mv| self.keeps_king_safe(mv)))
    }

    /// Validate a requested move for the side to move
    pub fn resolve(&self, from: &str, to: &str, promotion: Option<&str>) -> Result<Move, MoveError> {
        let from = Square::parse(from)?;
        let to = Square::parse(to)?;
        let piece = self.piece_at(from).ok_or(MoveError::NoPiece)?;
        if piece.side != self.turn {
            return Err(MoveError::NotYourPiece);
        }
        let promotion = match promotion.map(str::trim).filter(|p| !p.is_empty()) {
            Some(p) => Some(PieceKind::promotion(p)?),
            None => None,
        };

        let candidates: Vec<Move> = self
            .pseudo_moves_from(from)
            .into_iter()
            .filter(|mv| mv.to == to)
            .collect();
        if candidates.is_empty() {
            return Err(MoveError::IllegalMove);
        }
        let chosen = if candidates.iter().any(|mv| mv.promotion.is_some()) {
            let kind = promotion.ok_or(MoveError::PromotionRequired)?;
            candidates
                .into_iter()
                .find(|mv| mv.promotion == Some(kind))
                .ok_or(MoveError::BadPromotion)?
        } else {
            candidates[0]
        };
        if !self.keeps_king_safe(&chosen) {
            return Err(MoveError::LeavesKingInCheck);
        }
        Ok(chosen)
    }

    /// Play `mv` without legality checks
    pub fn apply_unchecked(&mut self, mv: &Move) {
        let Some(piece) = self.board[mv.from.index()] else {
            return;
        };
        let captured = self.board[mv.to.index()];

        self.board[mv.from.index()] = None;
        if mv.en_passant {
            if let Some(victim) = Square::at(mv.from.row() as i8, mv.to.col() as i8) {
                self.board[victim.index()] = None;
            }
        }
        self.board[mv.to.index()] = Some(match mv.promotion {
            Some(kind) => Piece::new(piece.side, kind),
            None => piece,
        });

        if let Some(castle) = mv.castle {
            let row = mv.from.row();
            let (rook_from, rook_to) = match castle {
                Castle::KingSide => (Square(row * 8 + 7), Square(row * 8 + 5)),
                Castle::QueenSide => (Square(row * 8), Square(row * 8 + 3)),
            };
            self.board[rook_to.index()] = self.board[rook_from.index()].take();
        }

        self.castling.touch(mv.from);
        self.castling.touch(mv.to);

        self.ep = None;
        if piece.kind == PieceKind::Pawn && mv.from.row().abs_diff(mv.to.row()) == 2 {
            self.ep = Square::at((mv.from.row() as i8 + mv.to.row() as i8) / 2, mv.from.col() as i8);
        }

        if piece.kind == PieceKind::Pawn || captured.is_some() || mv.en_passant {
            self.halfmove = 0;
        } else {
            self.halfmove += 1;
        }
        if self.turn == Side::Black {
            self.fullmove += 1;
        }
        self.turn = self.turn.opponent();
    }

    /// Neither side can possibly deliver mate
    pub fn insufficient_material(&self) -> bool {
        let mut minors = Vec::new();
        for (i, p) in self.board.iter().enumerate() {
            match p {
                None => {}
                Some(p) if p.kind == PieceKind::King => {}
                Some(p) if matches!(p.kind, PieceKind::Bishop | PieceKind::Knight) => minors.push((Square(i as u8), *p)),
                Some(_) => return false,
            }
        }
        match minors.as_slice() {
            [] | [_] => true,
            all => {
                let bishops_only = all.iter().all(|(_, p)| p.kind == PieceKind::Bishop);
                let first = all[0].0.is_light();
                bishops_only && all.iter().all(|(sq, _)| sq.is_light() == first)
            }
        }
    }

    fn placement(&self) -> String {
        let mut rows = Vec::with_capacity(8);
        for row in self.board.chunks(8) {
            let mut s = String::new();
            let mut run = 0;
            for p in row {
                match p {
                    None => run += 1,
                    Some(p) => {
                        if run > 0 {
                            s.push_str(&run.to_string());
                            run = 0;
                        }
                        s.push(p.fen_char());
                    }
                }
            }
            if run > 0 {
                s.push_str(&run.to_string());
            }
            rows.push(s);
        }
        rows.join("/")
    }

    fn key_with_ep(&self, ep: Option<Square>) -> String {
        let ep = ep.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string());
        format!("{} {} {} {}", self.placement(), self.turn.fen_char(), self.castling.fen(), ep)
    }

    /// Identity of the position for repetition counting. The en-passant
    /// square only counts while a capture onto it is legal.
    pub fn repetition_key(&self) -> String {
        let ep = self
            .ep
            .filter(|_| self.legal_moves().iter().any(|mv| mv.en_passant));
        self.key_with_ep(ep)
    }

    pub fn fen(&self) -> String {
        format!("{} {} {}", self.key_with_ep(self.ep), self.halfmove, self.fullmove)
    }

    /// Eight strings, rank 8 first, '.' for empty squares
    pub fn rows(&self) -> Vec<String> {
        self.board
            .chunks(8)
            .map(|row| row.iter().map(|p| p.map(Piece::fen_char).unwrap_or('.')).collect())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play(pos: &mut Position, moves: &[&str]) {
        for uci in moves {
            let promo = uci.get(4..5);
            let mv = pos.resolve(&uci[0..2], &uci[2..4], promo).unwrap();
            pos.apply_unchecked(&mv);
        }
    }

    #[test]
    fn test_square_parse() {
        assert_eq!(Square::parse("a8").unwrap(), Square(0));
        assert_eq!(Square::parse("h1").unwrap(), Square(63));
        assert_eq!(Square::parse("e2").unwrap().to_string(), "e2");
        assert_eq!(Square::parse("i9"), Err(MoveError::BadSquare));
        assert_eq!(Square::parse("e"), Err(MoveError::BadSquare));
    }

    #[test]
    fn test_initial_position() {
        let pos = Position::initial();
        assert_eq!(pos.legal_moves().len(), 20);
        assert_eq!(pos.fen(), "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1");
    }

    #[test]
    fn test_double_push_sets_en_passant() {
        let mut pos = Position::initial();
        play(&mut pos, &["e2e4"]);
        assert_eq!(pos.ep_square().map(|s| s.to_string()), Some("e3".to_string()));
        assert_eq!(pos.turn(), Side::Black);
    }

    #[test]
    fn test_repetition_key_ignores_unusable_en_passant() {
        let mut pos = Position::initial();
        play(&mut pos, &["e2e4"]);
        assert!(pos.repetition_key().ends_with(" b KQkq -"));
        assert!(pos.fen().contains(" e3 "));

        play(&mut pos, &["a7a6", "e4e5", "d7d5"]);
        assert!(pos.repetition_key().ends_with(" w KQkq d6"));
    }

    #[test]
    fn test_en_passant_capture() {
        let mut pos = Position::initial();
        play(&mut pos, &["e2e4", "a7a6", "e4e5", "d7d5", "e5d6"]);
        assert_eq!(pos.piece_at(Square::parse("d5").unwrap()), None);
        assert_eq!(
            pos.piece_at(Square::parse("d6").unwrap()),
            Some(Piece::new(Side::White, PieceKind::Pawn))
        );
    }

    #[test]
    fn test_castling_kingside() {
        let mut pos = Position::initial();
        play(&mut pos, &["e2e4", "e7e5", "g1f3", "b8c6", "f1c4", "g8f6", "e1g1"]);
        assert_eq!(
            pos.piece_at(Square::parse("f1").unwrap()),
            Some(Piece::new(Side::White, PieceKind::Rook))
        );
        assert_eq!(pos.castle_rights(), "kq");
    }

    #[test]
    fn test_cannot_castle_through_attack() {
        let pos = Position::from_pieces(
            &[
                ("e1", Side::White, PieceKind::King),
                ("h1", Side::White, PieceKind::Rook),
                ("e8", Side::Black, PieceKind::King),
                ("f8", Side::Black, PieceKind::Rook),
            ],
            Side::White,
        )
        .unwrap();
        assert_eq!(pos.resolve("e1", "g1", None), Err(MoveError::IllegalMove));
    }

    #[test]
    fn test_pinned_piece_cannot_expose_king() {
        let pos = Position::from_pieces(
            &[
                ("e1", Side::White, PieceKind::King),
                ("e2", Side::White, PieceKind::Rook),
                ("e8", Side::Black, PieceKind::Rook),
                ("a8", Side::Black, PieceKind::King),
            ],
            Side::White,
        )
        .unwrap();
        assert_eq!(pos.resolve("e2", "d2", None), Err(MoveError::LeavesKingInCheck));
        assert!(pos.resolve("e2", "e5", None).is_ok());
    }

    #[test]
    fn test_promotion_requires_choice() {
        let pos = Position::from_pieces(
            &[
                ("a7", Side::White, PieceKind::Pawn),
                ("e1", Side::White, PieceKind::King),
                ("h8", Side::Black, PieceKind::King),
            ],
            Side::White,
        )
        .unwrap();
        assert_eq!(pos.resolve("a7", "a8", None), Err(MoveError::PromotionRequired));
        assert_eq!(pos.resolve("a7", "a8", Some("k")), Err(MoveError::BadPromotion));
        let mv = pos.resolve("a7", "a8", Some("n")).unwrap();
        assert_eq!(mv.uci(), "a7a8n");
    }

    #[test]
    fn test_fools_mate_has_no_legal_moves() {
        let mut pos = Position::initial();
        play(&mut pos, &["f2f3", "e7e5", "g2g4", "d8h4"]);
        assert!(pos.in_check(Side::White));
        assert!(!pos.has_legal_move());
    }

    #[test]
    fn test_insufficient_material() {
        let kk = Position::from_pieces(
            &[("e1", Side::White, PieceKind::King), ("e8", Side::Black, PieceKind::King)],
            Side::White,
        )
        .unwrap();
        assert!(kk.insufficient_material());
        let krk = Position::from_pieces(
            &[
                ("e1", Side::White, PieceKind::King),
                ("a1", Side::White, PieceKind::Rook),
                ("e8", Side::Black, PieceKind::King),
            ],
            Side::White,
        )
        .unwrap();
        assert!(!krk.insufficient_material());
        assert!(!Position::initial().insufficient_material());
    }

    #[test]
    fn test_every_legal_move_keeps_king_safe() {
        let mut pos = Position::initial();
        play(&mut pos, &["e2e4", "d7d5", "f1b5"]);
        // black is in check from the bishop
        assert!(pos.in_check(Side::Black));
        for mv in pos.legal_moves() {
            let mut next = pos.clone();
            next.apply_unchecked(&mv);
            assert!(!next.in_check(Side::Black), "{} leaves king in check", mv.uci());
        }
    }
}
